//! Lay out simplified wiki HTML as wrapped, styled lines.
//!
//! This crate turns the restricted HTML found in item descriptions of an
//! online wiki into a list of measured lines which can be drawn inside a
//! scrollable in-game panel, and hit-tested for links.  Measuring and
//! drawing are done through small host traits ([`render::FontMetrics`],
//! [`render::Canvas`]), and images are loaded in the background through an
//! [`images::ImageResolver`] without ever blocking layout.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use omnisearch_html::config;
//! use omnisearch_html::images::Placeholders;
//! use omnisearch_html::render::cell_metrics::CellMetrics;
//!
//! let mut renderer = config::standard()
//!     .scale(1.0)
//!     .build(CellMetrics::new(6.0, 9.0), Arc::new(Placeholders))
//!     .unwrap();
//! renderer.prepare("<p>Hello <a href='/w/Stone'>stone</a></p>", 300.0, Some("https://wiki.test/"));
//! assert_eq!(renderer.lines().len(), 1);
//! assert_eq!(renderer.link_url_at(40.0, 2.0, 0.0, 0.0), Some("https://wiki.test/w/Stone"));
//! ```
//!
//! A small demonstration program lays out an HTML file on a grid of
//! character cells and prints the lines:
//!
//! ```sh
//! $ cargo run --example layout_dump -- --width 40 page.html
//! [...]
//! ```

#![deny(missing_docs)]

#[macro_use]
mod macros;

pub mod css;
pub mod images;
pub mod render;
pub mod source;

pub use render::html_renderer::HtmlRenderer;
pub use render::line::Colour;

use css::{parse_style_attribute, Bullet, OrderedMarker};
use images::BuiltinIcon;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use html5ever::tree_builder::TreeBuilderOpts;
use markup5ever_rcdom::{
    Handle,
    NodeData::{Comment, Document, Element},
    RcDom,
};
use std::io;
use url::Url;

/// Errors from this crate.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The font can't be used for layout.
    #[error("Font has no usable line height")]
    NoFont,
    /// The image worker threads could not be started.
    #[error("Could not start image workers")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    /// Fetching an image failed.
    #[error("Failed to fetch {url}: {reason}")]
    ImageFetch {
        /// The image URL
        url: String,
        /// What went wrong
        reason: String,
    },
    /// Image data could not be decoded.
    #[error("Failed to decode image")]
    ImageDecode(#[from] image::ImageError),
    /// The host refused to create a texture.
    #[error("Texture upload for {url} failed: {reason}")]
    TextureUpload {
        /// The image URL
        url: String,
        /// What went wrong
        reason: String,
    },
    /// Reading the input failed.
    #[error("I/O error")]
    IoError(#[from] std::io::Error),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of element a block came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTag {
    /// `<p>`
    Paragraph,
    /// `<h1>` to `<h5>`
    Heading(u8),
    /// `<div>`
    Div,
    /// `<table>`
    Table,
}

/// The node-specific information distilled from the DOM.
#[derive(Clone, Debug)]
pub enum RenderNodeInfo {
    /// Some text.
    Text(String),
    /// A group of nodes collected together.
    Container(Vec<RenderNode>),
    /// A link (absolute target) with contained nodes
    Link(String, Vec<RenderNode>),
    /// A strong region
    Strong(Vec<RenderNode>),
    /// An emphasised region
    Em(Vec<RenderNode>),
    /// A region with an inline colour
    Coloured(Colour, Vec<RenderNode>),
    /// An image caption
    Caption(Vec<RenderNode>),
    /// A section title
    Title(Vec<RenderNode>),
    /// An image, with its declared size (before scaling)
    Img {
        /// Absolute source URL
        src: String,
        /// Declared width
        width: Option<u32>,
        /// Declared height
        height: Option<u32>,
    },
    /// A built-in icon
    Icon(&'static BuiltinIcon),
    /// A block element with children
    Block {
        /// The element the block came from
        tag: BlockTag,
        /// True if the element's only child element is an image
        image_only: bool,
        /// Contents
        children: Vec<RenderNode>,
    },
    /// A line break
    Break,
    /// An unordered list
    Ul(Bullet, Vec<RenderNode>),
    /// An ordered list
    Ol {
        /// Number of the first item
        start: i64,
        /// Marker style
        marker: OrderedMarker,
        /// The list's children
        items: Vec<RenderNode>,
    },
    /// A list item
    ListItem(Vec<RenderNode>),
}

/// A node of the render tree.
#[derive(Clone, Debug)]
pub struct RenderNode {
    info: RenderNodeInfo,
}

impl RenderNode {
    /// Create a node from the RenderNodeInfo.
    pub fn new(info: RenderNodeInfo) -> RenderNode {
        RenderNode { info }
    }

    /// The node's contents.
    pub fn info(&self) -> &RenderNodeInfo {
        &self.info
    }

    pub(crate) fn into_info(self) -> RenderNodeInfo {
        self.info
    }

    /// Concatenate all the text below this node.
    pub fn text(&self) -> String {
        use RenderNodeInfo::*;
        let mut out = String::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match &node.info {
                Text(t) => out.push_str(t),
                Container(cs) | Link(_, cs) | Strong(cs) | Em(cs) | Coloured(_, cs)
                | Caption(cs) | Title(cs) | Ul(_, cs) | ListItem(cs) => {
                    stack.extend(cs.iter().rev())
                }
                Block { children, .. } | Ol { items: children, .. } => {
                    stack.extend(children.iter().rev())
                }
                Img { .. } | Icon(_) | Break => (),
            }
        }
        out
    }
}

/// Combines the results of a node's children into the node's own result.
type ResultReducer<'a, C, R> = dyn FnOnce(&mut C, Vec<R>) -> Option<R> + 'a;

/// The result of trying to process one node.
pub(crate) enum TreeMapResult<'a, C, N, R> {
    /// A completed result.
    Finished(R),
    /// Deferred completion - can be turned into a result
    /// once the vector of children are processed.
    PendingChildren {
        children: Vec<N>,
        cons: Box<ResultReducer<'a, C, R>>,
    },
    /// Nothing (e.g. a comment or other ignored element).
    Nothing,
}

/// Walk a tree depth first without recursion.  `process_node` either
/// finishes a node or asks for its children first; once they are done the
/// node's reducer combines their results.
pub(crate) fn tree_map_reduce<'a, C, N, R, M>(
    context: &mut C,
    top: N,
    mut process_node: M,
) -> Option<R>
where
    M: FnMut(&mut C, N) -> TreeMapResult<'a, C, N, R>,
{
    /// A node partially processed, waiting for its children.
    struct PendingNode<'a, C, R, N> {
        /// How to make the node once finished
        construct: Box<ResultReducer<'a, C, R>>,
        /// Children already processed
        children: Vec<R>,
        /// Iterator of child nodes not yet processed
        to_process: std::vec::IntoIter<N>,
    }

    let mut pending_stack = vec![PendingNode {
        // We only expect one child, which we'll just return.
        construct: Box::new(|_, mut cs: Vec<R>| cs.pop()),
        children: Vec::new(),
        to_process: vec![top].into_iter(),
    }];
    loop {
        let Some(top) = pending_stack.last_mut() else {
            break None;
        };
        if let Some(node) = top.to_process.next() {
            match process_node(context, node) {
                TreeMapResult::Finished(result) => top.children.push(result),
                TreeMapResult::PendingChildren { children, cons } => {
                    pending_stack.push(PendingNode {
                        construct: cons,
                        children: Vec::new(),
                        to_process: children.into_iter(),
                    });
                }
                TreeMapResult::Nothing => {}
            }
        } else {
            // No more children, so finally construct the parent.
            let Some(completed) = pending_stack.pop() else {
                break None;
            };
            let reduced = (completed.construct)(context, completed.children);
            match (reduced, pending_stack.last_mut()) {
                (Some(node), Some(parent)) => parent.children.push(node),
                // Finished the whole stack!
                (result, None) => break result,
                (None, Some(_)) => {}
            }
        }
    }
}

/// Settings used while converting the DOM.
#[derive(Debug, Clone, Default)]
pub struct DomContext {
    /// The document's URL, for resolving relative links.
    pub base: Option<Url>,
    /// Elements with any of these classes are dropped with their contents.
    pub skip_classes: Vec<String>,
}

impl DomContext {
    /// Resolve a link or image reference.  References which can't be
    /// resolved are kept as they are.
    pub fn resolve(&self, reference: &str) -> String {
        match &self.base {
            Some(base) => match base.join(reference) {
                Ok(url) => url.into(),
                Err(err) => {
                    log::debug!("keeping unresolvable reference {:?}: {}", reference, err);
                    reference.into()
                }
            },
            None => reference.into(),
        }
    }
}

/// Convert a DOM tree or subtree into a render tree.
pub fn dom_to_render_tree(handle: Handle, context: &DomContext) -> Option<RenderNode> {
    html_trace!("### dom_to_render_tree: HTML: {:?}", handle);
    let result = tree_map_reduce(&mut (), handle, |_, handle| {
        process_dom_node(handle, context)
    });
    html_trace!("### dom_to_render_tree: out= {:#?}", result);
    result
}

fn pending<'a, F>(handle: &Handle, f: F) -> TreeMapResult<'a, (), Handle, RenderNode>
where
    F: FnOnce(Vec<RenderNode>) -> RenderNodeInfo + 'static,
{
    TreeMapResult::PendingChildren {
        children: handle.children.borrow().clone(),
        cons: Box::new(move |_, cs| Some(RenderNode::new(f(cs)))),
    }
}

fn get_attr(attrs: &[html5ever::Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|attr| &*attr.name.local == name)
        .map(|attr| attr.value.to_string())
}

fn non_empty_attr(attrs: &[html5ever::Attribute], name: &str) -> Option<String> {
    get_attr(attrs, name).filter(|v| !v.trim().is_empty())
}

fn has_class(attrs: &[html5ever::Attribute], pred: impl Fn(&str) -> bool) -> bool {
    get_attr(attrs, "class")
        .map(|classes| classes.split_whitespace().any(pred))
        .unwrap_or(false)
}

fn element_name(handle: &Handle) -> Option<String> {
    match &handle.data {
        Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

fn is_image_only(handle: &Handle) -> bool {
    let children = handle.children.borrow();
    let mut elements = children.iter().filter_map(element_name);
    matches!((elements.next().as_deref(), elements.next()), (Some("img"), None))
}

/// Find the first `<use>` below an icon `<svg>` and map its reference.
fn find_icon(handle: &Handle) -> Option<&'static BuiltinIcon> {
    let mut stack = vec![handle.clone()];
    while let Some(node) = stack.pop() {
        if let Element { name, attrs, .. } = &node.data {
            if &*name.local == "use" {
                // `xlink:href` is parsed into the xlink namespace with local
                // name `href`, so this matches both spellings.
                let href = non_empty_attr(&attrs.borrow(), "href")?;
                return images::builtin_icon(href.trim_start_matches('#'));
            }
        }
        stack.extend(node.children.borrow().iter().rev().cloned());
    }
    None
}

fn parse_size(value: Option<String>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Turn the first `<p>` child of a list item into a plain container, so it
/// stays on the line of the item's marker.  Later paragraphs keep their
/// block breaks.
fn unwrap_item_paragraphs(children: Vec<RenderNode>) -> Vec<RenderNode> {
    let mut unwrapped = false;
    children
        .into_iter()
        .map(|child| match child.info {
            RenderNodeInfo::Block {
                tag: BlockTag::Paragraph,
                children,
                ..
            } if !unwrapped => {
                unwrapped = true;
                RenderNode::new(RenderNodeInfo::Container(children))
            }
            info => RenderNode::new(info),
        })
        .collect()
}

fn process_dom_node<'a>(
    handle: Handle,
    context: &DomContext,
) -> TreeMapResult<'a, (), Handle, RenderNode> {
    use RenderNodeInfo::*;
    use TreeMapResult::*;

    match handle.data {
        Document => pending(&handle, Container),
        Comment { .. } => Nothing,
        Element {
            ref name,
            ref attrs,
            ..
        } => {
            let attrs = attrs.borrow();
            if !context.skip_classes.is_empty()
                && has_class(&attrs, |c| context.skip_classes.iter().any(|s| s == c))
            {
                html_trace!("Skipping element {:?}", name.local);
                return Nothing;
            }
            match &*name.local {
                "head" | "script" | "style" | "link" | "meta" | "title" => Nothing,
                "a" => match non_empty_attr(&attrs, "href") {
                    Some(href) => {
                        let target = context.resolve(href.trim());
                        pending(&handle, move |cs| Link(target, cs))
                    }
                    None => pending(&handle, Container),
                },
                "strong" | "b" => pending(&handle, Strong),
                "em" | "i" => pending(&handle, Em),
                "span" => {
                    if has_class(&attrs, |c| c == "figcaption") {
                        pending(&handle, Caption)
                    } else if has_class(&attrs, |c| {
                        c == "common-text-title" || c.starts_with("common-text-title-")
                    }) {
                        pending(&handle, Title)
                    } else {
                        let colour = get_attr(&attrs, "style")
                            .and_then(|style| parse_style_attribute(&style).colour);
                        match colour {
                            Some(colour) => pending(&handle, move |cs| Coloured(colour, cs)),
                            None => pending(&handle, Container),
                        }
                    }
                }
                "img" => {
                    let src = non_empty_attr(&attrs, "data-src")
                        .or_else(|| non_empty_attr(&attrs, "data-original"))
                        .or_else(|| non_empty_attr(&attrs, "src"));
                    match src {
                        Some(src) => Finished(RenderNode::new(Img {
                            src: context.resolve(src.trim()),
                            width: parse_size(
                                get_attr(&attrs, "data-width").or_else(|| get_attr(&attrs, "width")),
                            ),
                            height: parse_size(
                                get_attr(&attrs, "data-height")
                                    .or_else(|| get_attr(&attrs, "height")),
                            ),
                        })),
                        None => Nothing,
                    }
                }
                "svg" => {
                    if has_class(&attrs, |c| c == "common-mcicon") {
                        match find_icon(&handle) {
                            Some(icon) => Finished(RenderNode::new(Icon(icon))),
                            None => Nothing,
                        }
                    } else {
                        pending(&handle, Container)
                    }
                }
                "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "div" | "table" => {
                    let tag = match &*name.local {
                        "p" => BlockTag::Paragraph,
                        "div" => BlockTag::Div,
                        "table" => BlockTag::Table,
                        h => BlockTag::Heading(h[1..].parse().unwrap_or(1)),
                    };
                    let image_only = is_image_only(&handle);
                    pending(&handle, move |children| Block {
                        tag,
                        image_only,
                        children,
                    })
                }
                "br" => Finished(RenderNode::new(Break)),
                "ul" => {
                    let style = get_attr(&attrs, "style")
                        .map(|s| parse_style_attribute(&s))
                        .unwrap_or_default();
                    let bullet = Bullet::from_style(style.list_style.as_ref());
                    pending(&handle, move |items| Ul(bullet, items))
                }
                "ol" => {
                    let start = get_attr(&attrs, "start")
                        .and_then(|s| s.trim().parse().ok())
                        .unwrap_or(1);
                    let style = get_attr(&attrs, "style")
                        .map(|s| parse_style_attribute(&s))
                        .unwrap_or_default();
                    let marker = OrderedMarker::from_style(style.list_style.as_ref());
                    pending(&handle, move |items| Ol {
                        start,
                        marker,
                        items,
                    })
                }
                "li" => pending(&handle, |cs| ListItem(unwrap_item_paragraphs(cs))),
                _ => {
                    html_trace!("Unhandled element: {:?}", name.local);
                    pending(&handle, Container)
                }
            }
        }
        markup5ever_rcdom::NodeData::Text { ref contents } => {
            Finished(RenderNode::new(Text(contents.borrow().to_string())))
        }
        _ => Nothing,
    }
}

fn parse_opts() -> ParseOpts {
    ParseOpts {
        tree_builder: TreeBuilderOpts {
            drop_doctype: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Parse an HTML string into a render tree.  Parsing is lenient: any input
/// gives some tree, possibly an empty one.
pub fn parse_str(html: &str, context: &DomContext) -> RenderNode {
    let dom = parse_document(RcDom::default(), parse_opts()).one(html);
    dom_to_render_tree(dom.document.clone(), context)
        .unwrap_or_else(|| RenderNode::new(RenderNodeInfo::Container(Vec::new())))
}

/// Reads and parses HTML from `input` into a render tree.
pub fn parse(mut input: impl io::Read, context: &DomContext) -> Result<RenderNode> {
    let dom = parse_document(RcDom::default(), parse_opts())
        .from_utf8()
        .read_from(&mut input)?;
    Ok(dom_to_render_tree(dom.document.clone(), context)
        .unwrap_or_else(|| RenderNode::new(RenderNodeInfo::Container(Vec::new()))))
}

pub mod config {
    //! Configure layout using the `Config` type, which can be constructed
    //! with [`standard`].

    use std::sync::Arc;

    use crate::images::ImageResolver;
    use crate::render::html_renderer::HtmlRenderer;
    use crate::render::FontMetrics;
    use crate::{Error, Result};

    /// Layout and drawing settings.
    #[derive(Clone, Debug, PartialEq)]
    pub struct Config {
        pub(crate) scale: f32,
        pub(crate) line_spacing: f32,
        pub(crate) width_correction: f32,
        pub(crate) image_scale: f32,
        pub(crate) block_margin: f32,
        pub(crate) title_margin: f32,
        pub(crate) skip_classes: Vec<String>,
    }

    impl Default for Config {
        fn default() -> Self {
            Config {
                scale: 0.85,
                line_spacing: 1.2,
                width_correction: 1.0,
                image_scale: 0.2,
                block_margin: 0.5,
                title_margin: 0.6,
                skip_classes: vec!["common-text-menu".into(), "uknowtoomuch".into()],
            }
        }
    }

    impl Config {
        /// Set the base draw scale (font units to screen pixels).
        pub fn scale(mut self, scale: f32) -> Self {
            self.scale = scale;
            self
        }

        /// Set the multiplier on each line's scaled height.
        pub fn line_spacing(mut self, spacing: f32) -> Self {
            self.line_spacing = spacing;
            self
        }

        /// Set the width correction factor.  Use a value above 1.0 when the
        /// host draws text narrower than the font metrics report.
        pub fn width_correction(mut self, factor: f32) -> Self {
            self.width_correction = factor;
            self
        }

        /// Set the factor from an image's declared size to its draw size.
        pub fn image_scale(mut self, factor: f32) -> Self {
            self.image_scale = factor;
            self
        }

        /// Set the space after blocks and captions, in line heights.
        pub fn block_margin(mut self, lines: f32) -> Self {
            self.block_margin = lines;
            self
        }

        /// Set the space after titles, in line heights.
        pub fn title_margin(mut self, lines: f32) -> Self {
            self.title_margin = lines;
            self
        }

        /// Also drop elements with class `class`.
        pub fn skip_class(mut self, class: &str) -> Self {
            self.skip_classes.push(class.into());
            self
        }

        /// Don't drop any elements by class.
        pub fn no_skip_classes(mut self) -> Self {
            self.skip_classes.clear();
            self
        }

        pub(crate) fn validate(&self) -> Result<()> {
            let positive = |v: f32| v.is_finite() && v > 0.0;
            let non_negative = |v: f32| v.is_finite() && v >= 0.0;
            if !positive(self.scale) {
                return Err(Error::InvalidConfig("scale must be positive"));
            }
            if !positive(self.line_spacing) {
                return Err(Error::InvalidConfig("line spacing must be positive"));
            }
            if !positive(self.width_correction) {
                return Err(Error::InvalidConfig("width correction must be positive"));
            }
            if !positive(self.image_scale) {
                return Err(Error::InvalidConfig("image scale must be positive"));
            }
            if !non_negative(self.block_margin) || !non_negative(self.title_margin) {
                return Err(Error::InvalidConfig("margins must not be negative"));
            }
            Ok(())
        }

        /// Create a renderer measuring with `font` and loading images with
        /// `images`.
        pub fn build<F: FontMetrics>(
            self,
            font: F,
            images: Arc<dyn ImageResolver>,
        ) -> Result<HtmlRenderer<F>> {
            HtmlRenderer::with_config(font, images, self)
        }
    }

    /// Return the standard configuration.
    pub fn standard() -> Config {
        Config::default()
    }
}

#[cfg(test)]
mod tests;
