//! Inline style support.
//!
//! Only the `style=""` attribute is looked at; there is no stylesheet
//! cascade.  Unknown or malformed declarations are ignored so that a bad
//! attribute never changes the surrounding style.

pub(crate) mod parser;

use self::parser::{parse_rules, Decl};
pub use self::parser::ListStyleType;
use crate::Colour;

/// The declarations from a `style` attribute which affect rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InlineStyle {
    pub colour: Option<Colour>,
    pub list_style: Option<ListStyleType>,
}

pub(crate) fn parse_style_attribute(text: &str) -> InlineStyle {
    html_trace_quiet!("Parsing inline style: {}", text);
    let mut style = InlineStyle::default();
    // Later declarations win, as in a real cascade.
    for decl in parse_rules(text) {
        match decl {
            Decl::Color { value } => style.colour = Some(value),
            Decl::ListStyleType { value } => style.list_style = Some(value),
            Decl::Unknown { .. } => (),
        }
    }
    html_trace_quiet!("Parsed inline style: {:?}", style);
    style
}

/// The marker used for items of an ordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderedMarker {
    /// `1. `
    Decimal,
    /// `1) `, used for every declared style other than `decimal`.
    Paren,
}

impl OrderedMarker {
    pub(crate) fn from_style(style: Option<&ListStyleType>) -> OrderedMarker {
        match style {
            None | Some(ListStyleType::Decimal) => OrderedMarker::Decimal,
            Some(_) => OrderedMarker::Paren,
        }
    }

    /// The prefix for the item numbered `i`.
    pub fn prefix(self, i: i64) -> String {
        match self {
            OrderedMarker::Decimal => format!("{}. ", i),
            OrderedMarker::Paren => format!("{}) ", i),
        }
    }
}

/// The bullet used for items of an unordered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bullet {
    /// `•`, the default
    Disc,
    /// `◦`
    Circle,
    /// `■`
    Square,
}

impl Bullet {
    pub(crate) fn from_style(style: Option<&ListStyleType>) -> Bullet {
        match style {
            Some(ListStyleType::Circle) => Bullet::Circle,
            Some(ListStyleType::Square) => Bullet::Square,
            _ => Bullet::Disc,
        }
    }

    /// The item prefix, including the trailing space.
    pub fn prefix(self) -> &'static str {
        match self {
            Bullet::Disc => "• ",
            Bullet::Circle => "◦ ",
            Bullet::Square => "■ ",
        }
    }
}
