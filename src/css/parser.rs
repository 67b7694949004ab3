//! Parsing for the subset of CSS found in `style=""` attributes.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1, take_while_m_n},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt, recognize},
    sequence::{delimited, preceded},
    IResult, Parser,
};

use crate::Colour;

/// The marker style requested for a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStyleType {
    /// `decimal`
    Decimal,
    /// `disc`
    Disc,
    /// `circle`
    Circle,
    /// `square`
    Square,
    /// Anything else (`lower-roman`, `none`, ...).
    Other(String),
}

impl ListStyleType {
    fn from_keyword(word: &str) -> ListStyleType {
        match word {
            "decimal" => ListStyleType::Decimal,
            "disc" => ListStyleType::Disc,
            "circle" => ListStyleType::Circle,
            "square" => ListStyleType::Square,
            other => ListStyleType::Other(other.into()),
        }
    }

    fn is_keyword(word: &str) -> bool {
        matches!(word, "decimal" | "disc" | "circle" | "square")
    }
}

#[derive(Debug, PartialEq)]
pub struct PropertyName(pub String);

#[derive(Debug, PartialEq)]
pub enum Decl {
    Color { value: Colour },
    ListStyleType { value: ListStyleType },
    Unknown { name: PropertyName, value: String },
}

fn parse_ident(text: &str) -> IResult<&str, String> {
    map(
        recognize((
            opt(char('-')),
            take_while1(|c: char| c == '_' || c.is_ascii_alphabetic()),
            take_while(|c: char| c == '_' || c == '-' || c.is_ascii_alphanumeric()),
        )),
        |s: &str| s.to_ascii_lowercase(),
    )
    .parse(text)
}

fn parse_property_name(text: &str) -> IResult<&str, PropertyName> {
    map(preceded(multispace0, parse_ident), PropertyName).parse(text)
}

/// Parse one `name: value` declaration (without the trailing `;`).
///
/// Returns `Ok((_, None))` for declarations which are recognised but have a
/// value we can't use, so the caller can carry on with the rest.
pub fn parse_declaration(text: &str) -> IResult<&str, Option<Decl>> {
    let (rest, (prop, _, _, value)) = (
        parse_property_name,
        multispace0,
        char(':'),
        take_while(|c: char| c != ';'),
    )
        .parse(text)?;
    let value = value.trim();
    let decl = match prop.0.as_str() {
        "color" => match all_consuming(parse_color).parse(value) {
            Ok((_, value)) => Some(Decl::Color { value }),
            Err(_) => None,
        },
        "list-style-type" => match all_consuming(parse_ident).parse(value) {
            Ok((_, word)) => Some(Decl::ListStyleType {
                value: ListStyleType::from_keyword(&word),
            }),
            Err(_) => None,
        },
        // Only the type keyword of the shorthand matters here.
        "list-style" => value
            .split_whitespace()
            .map(|w| w.to_ascii_lowercase())
            .find(|w| ListStyleType::is_keyword(w))
            .map(|w| Decl::ListStyleType {
                value: ListStyleType::from_keyword(&w),
            }),
        _ => Some(Decl::Unknown {
            name: prop,
            value: value.into(),
        }),
    };
    Ok((rest, decl))
}

/// Parse every declaration in a style attribute.  Malformed declarations
/// are skipped.
pub fn parse_rules(text: &str) -> Vec<Decl> {
    text.split(';')
        .filter(|d| !d.trim().is_empty())
        .filter_map(|d| parse_declaration(d).ok())
        .filter_map(|(_, decl)| decl)
        .collect()
}

fn hex1(text: &str) -> IResult<&str, u8> {
    map_res(take_while_m_n(1, 1, |c: char| c.is_ascii_hexdigit()), |s: &str| {
        u8::from_str_radix(s, 16).map(|v| v * 0x11)
    })
    .parse(text)
}

fn hex2(text: &str) -> IResult<&str, u8> {
    map_res(take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()), |s: &str| {
        u8::from_str_radix(s, 16)
    })
    .parse(text)
}

fn hex_colour6(text: &str) -> IResult<&str, Colour> {
    map(preceded(char('#'), (hex2, hex2, hex2)), |(r, g, b)| {
        Colour::rgb(r, g, b)
    })
    .parse(text)
}

fn hex_colour3(text: &str) -> IResult<&str, Colour> {
    map(preceded(char('#'), (hex1, hex1, hex1)), |(r, g, b)| {
        Colour::rgb(r, g, b)
    })
    .parse(text)
}

fn channel(text: &str) -> IResult<&str, u8> {
    delimited(multispace0, map_res(digit1, str::parse::<u8>), multispace0).parse(text)
}

fn rgb_func_colour(text: &str) -> IResult<&str, Colour> {
    map(
        delimited(
            (tag("rgb"), multispace0, char('(')),
            (channel, char(','), channel, char(','), channel),
            char(')'),
        ),
        |(r, _, g, _, b)| Colour::rgb(r, g, b),
    )
    .parse(text)
}

fn parse_color(text: &str) -> IResult<&str, Colour> {
    delimited(
        multispace0,
        alt((hex_colour6, hex_colour3, rgb_func_colour)),
        multispace0,
    )
    .parse(text)
}
