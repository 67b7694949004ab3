//! The laid-out content model: styled runs and images packed into lines.

use std::mem;
use std::sync::{Arc, OnceLock};

use crate::images::{BuiltinIcon, LoadedTexture, TextureRef};

/// An RGBA colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Colour {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Colour {
    /// The colour of ordinary body text.
    pub const TEXT: Colour = Colour::from_argb(0xFFD0D0D0);
    /// Anchor text.
    pub const LINK: Colour = Colour::from_argb(0xFF9090FF);
    /// Image captions.
    pub const CAPTION: Colour = Colour::from_argb(0xFF9E9E9E);
    /// Section titles.
    pub const TITLE: Colour = Colour::from_argb(0xFFE0E0E0);

    /// An opaque colour.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Colour {
        Colour { r, g, b, a: 0xff }
    }

    /// Unpack a packed `0xAARRGGBB` value.
    pub const fn from_argb(argb: u32) -> Colour {
        Colour {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Pack as `0xAARRGGBB`, the format most GUI toolkits draw with.
    pub const fn to_argb(self) -> u32 {
        (self.a as u32) << 24 | (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    /// The same colour with a different alpha.
    pub const fn with_alpha(self, a: u8) -> Colour {
        Colour { a, ..self }
    }
}

/// The inheritable text style in scope at some point of the document.
///
/// Styles are values: a child scope derives a new one with the `with_*`
/// methods, so a part can keep the style it was created with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Style {
    /// Text colour.
    pub colour: Colour,
    /// Bold text.
    pub bold: bool,
    /// Italic text.
    pub italic: bool,
    /// The target of the enclosing link, if any.
    pub link: Option<String>,
}

impl Default for Style {
    fn default() -> Self {
        Style {
            colour: Colour::TEXT,
            bold: false,
            italic: false,
            link: None,
        }
    }
}

impl Style {
    /// Copy with a different colour.
    pub fn with_colour(&self, colour: Colour) -> Style {
        Style {
            colour,
            ..self.clone()
        }
    }

    /// Copy with boldness set.
    pub fn with_bold(&self, bold: bool) -> Style {
        Style {
            bold,
            ..self.clone()
        }
    }

    /// Copy with italics set.
    pub fn with_italic(&self, italic: bool) -> Style {
        Style {
            italic,
            ..self.clone()
        }
    }

    /// Copy as a link to `target`.
    pub fn with_link(&self, target: &str) -> Style {
        Style {
            link: Some(target.into()),
            ..self.clone()
        }
    }
}

/// A run of text drawn in one style.
#[derive(Clone, Debug, PartialEq)]
pub struct StyledPart {
    text: String,
    style: Style,
    width: f32,
}

impl StyledPart {
    /// Create a run; `width` is the text's unscaled font width.
    pub fn new(text: String, style: Style, width: f32) -> StyledPart {
        StyledPart { text, style, width }
    }

    /// The text of the run.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The style the run was created with.
    pub fn style(&self) -> &Style {
        &self.style
    }

    /// Width in unscaled font pixels.
    pub fn width(&self) -> f32 {
        self.width
    }

    /// True if the run has nothing visible.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A texture which may still be loading.
///
/// The slot is filled at most once, when the image has been decoded and
/// uploaded.  Until then readers see the placeholder.
pub type TextureSlot = Arc<OnceLock<LoadedTexture>>;

/// Where an image part gets its pixels from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// A remote image, keyed by its absolute URL.
    Remote {
        /// Absolute URL of the image.
        url: String,
        /// Filled in once the texture is ready.
        texture: TextureSlot,
    },
    /// One of the built-in GUI icons.
    Icon(&'static BuiltinIcon),
}

/// An image placed inline.
#[derive(Clone, Debug)]
pub struct ImagePart {
    source: ImageSource,
    draw_width: f32,
    draw_height: f32,
}

impl ImagePart {
    /// A remote image drawn at the given unscaled size.
    pub fn remote(url: String, texture: TextureSlot, draw_width: f32, draw_height: f32) -> Self {
        ImagePart {
            source: ImageSource::Remote { url, texture },
            draw_width,
            draw_height,
        }
    }

    /// A built-in icon at its natural size.
    pub fn icon(icon: &'static BuiltinIcon) -> Self {
        ImagePart {
            source: ImageSource::Icon(icon),
            draw_width: icon.width as f32,
            draw_height: icon.height as f32,
        }
    }

    /// The image's URL, or `None` for built-in icons.
    pub fn source_key(&self) -> Option<&str> {
        match &self.source {
            ImageSource::Remote { url, .. } => Some(url),
            ImageSource::Icon(_) => None,
        }
    }

    /// True for built-in sprites.
    pub fn is_builtin_sprite(&self) -> bool {
        matches!(self.source, ImageSource::Icon(_))
    }

    /// Unscaled draw width.
    pub fn draw_width(&self) -> f32 {
        self.draw_width
    }

    /// Unscaled draw height.
    pub fn draw_height(&self) -> f32 {
        self.draw_height
    }

    /// The texture to draw right now; `TextureRef::Pending` until the
    /// remote image is ready.
    pub fn texture(&self) -> TextureRef {
        match &self.source {
            ImageSource::Remote { texture, .. } => match texture.get() {
                Some(loaded) => TextureRef::Loaded(loaded.id),
                None => TextureRef::Pending,
            },
            ImageSource::Icon(icon) => TextureRef::Sprite(icon),
        }
    }

    /// Pixel size of the decoded texture, once known.
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        match &self.source {
            ImageSource::Remote { texture, .. } => texture.get().map(|t| (t.width, t.height)),
            ImageSource::Icon(icon) => Some((icon.width, icon.height)),
        }
    }
}

/// An atomic unit of a line.
#[derive(Clone, Debug)]
pub enum RenderablePart {
    /// Some text
    Styled(StyledPart),
    /// An image or icon
    Image(ImagePart),
}

impl RenderablePart {
    /// Unscaled width.
    pub fn width(&self) -> f32 {
        match self {
            RenderablePart::Styled(p) => p.width,
            RenderablePart::Image(p) => p.draw_width,
        }
    }

    /// The link target under this part, if any.
    pub fn link(&self) -> Option<&str> {
        match self {
            RenderablePart::Styled(p) => p.style.link.as_deref(),
            RenderablePart::Image(_) => None,
        }
    }
}

/// What kind of content a line holds; decides how it is scaled and drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineType {
    /// Ordinary text.
    Text,
    /// A line containing a (non-icon) image; drawn centred.
    Image,
    /// An image caption; drawn smaller and centred.
    Caption,
    /// A section title; drawn larger and underlined.
    Title,
}

impl LineType {
    /// Scale relative to the renderer's base scale.
    pub fn scale(self) -> f32 {
        match self {
            LineType::Caption => 0.7,
            LineType::Title => 1.15,
            LineType::Text | LineType::Image => 1.0,
        }
    }
}

/// A finished, horizontally packed line.
#[derive(Clone, Debug)]
pub struct RenderableLine {
    parts: Vec<RenderablePart>,
    height: f32,
    total_width: f32,
    margin_bottom: f32,
    line_type: LineType,
}

impl RenderableLine {
    /// An empty line of the given type; `font_height` is the minimum height.
    pub fn new(font_height: f32, line_type: LineType) -> RenderableLine {
        RenderableLine {
            parts: Vec::new(),
            height: font_height,
            total_width: 0.0,
            margin_bottom: 0.0,
            line_type,
        }
    }

    /// The parts, left to right.
    pub fn parts(&self) -> &[RenderablePart] {
        &self.parts
    }

    /// Unscaled height: the tallest part, at least one font line.
    pub fn height(&self) -> f32 {
        self.height
    }

    /// Sum of unscaled part widths.
    pub fn total_width(&self) -> f32 {
        self.total_width
    }

    /// Unscaled space below the line.
    pub fn margin_bottom(&self) -> f32 {
        self.margin_bottom
    }

    /// The line's type.
    pub fn line_type(&self) -> LineType {
        self.line_type
    }

    /// True for caption lines.
    pub fn is_caption(&self) -> bool {
        self.line_type == LineType::Caption
    }

    /// Returns true if the line has no parts at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// True if the line holds an image or some non-whitespace text.
    pub fn has_content(&self) -> bool {
        self.parts.iter().any(|part| match part {
            RenderablePart::Image(_) => true,
            RenderablePart::Styled(p) => !p.is_blank(),
        })
    }

    /// True if the last part is text ending in whitespace.
    pub(crate) fn ends_with_space(&self) -> bool {
        match self.parts.last() {
            Some(RenderablePart::Styled(p)) => p.text.ends_with(char::is_whitespace),
            _ => false,
        }
    }

    /// The text of the line, ignoring styles and images.
    pub fn text(&self) -> String {
        let mut s = String::new();
        for part in &self.parts {
            if let RenderablePart::Styled(p) = part {
                s.push_str(&p.text);
            }
        }
        s
    }

    pub(crate) fn set_line_type(&mut self, line_type: LineType) {
        self.line_type = line_type;
    }

    pub(crate) fn set_margin_bottom(&mut self, margin: f32) {
        self.margin_bottom = margin;
    }

    /// Add a text run.  A run in the same style as the previous one is
    /// merged into it; `measure` gives the width of the merged text.
    pub(crate) fn push_text<M>(&mut self, text: &str, style: &Style, width: f32, measure: M)
    where
        M: FnOnce(&str) -> f32,
    {
        if let Some(RenderablePart::Styled(last)) = self.parts.last_mut() {
            if last.style == *style {
                last.text.push_str(text);
                let merged = measure(&last.text);
                self.total_width += merged - last.width;
                last.width = merged;
                return;
            }
        }
        self.total_width += width;
        self.parts.push(RenderablePart::Styled(StyledPart::new(
            text.into(),
            style.clone(),
            width,
        )));
    }

    /// Add an image.  Remote images turn the line into an image line.
    pub(crate) fn push_image(&mut self, image: ImagePart) {
        self.total_width += image.draw_width;
        if image.draw_height > self.height {
            self.height = image.draw_height;
        }
        if !image.is_builtin_sprite() {
            self.line_type = LineType::Image;
        }
        self.parts.push(RenderablePart::Image(image));
    }
}

/// Accumulates parts into lines, keeping the cursor for the open line.
#[derive(Debug)]
pub(crate) struct LineBuilder {
    lines: Vec<RenderableLine>,
    current: RenderableLine,
    /// Screen-space x position in the open line.
    cursor_x: f32,
    font_height: f32,
    /// Open caption and title scopes, innermost last.  Wrapped
    /// continuation lines take the innermost type.
    scopes: Vec<LineType>,
}

impl LineBuilder {
    pub fn new(font_height: f32) -> LineBuilder {
        LineBuilder {
            lines: Vec::new(),
            current: RenderableLine::new(font_height, LineType::Text),
            cursor_x: 0.0,
            font_height,
            scopes: Vec::new(),
        }
    }

    pub fn current(&self) -> &RenderableLine {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut RenderableLine {
        &mut self.current
    }

    pub fn cursor_x(&self) -> f32 {
        self.cursor_x
    }

    pub fn advance(&mut self, dx: f32) {
        self.cursor_x += dx;
    }

    /// Set the type of the open line and of lines wrapped from it.
    pub fn enter_scope(&mut self, line_type: LineType) {
        self.scopes.push(line_type);
        self.current.set_line_type(line_type);
    }

    /// Close the innermost scope; later lines go back to the enclosing one.
    pub fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn scope_type(&self) -> LineType {
        self.scopes.last().copied().unwrap_or(LineType::Text)
    }

    /// Start a new line.  Unless `force` is set this only happens when
    /// something has already been placed on the open line.
    pub fn new_line(&mut self, force: bool) {
        if force || self.cursor_x > 0.0 {
            let fresh = RenderableLine::new(self.font_height, self.scope_type());
            let done = mem::replace(&mut self.current, fresh);
            self.finish(done);
            self.cursor_x = 0.0;
        }
    }

    fn finish(&mut self, line: RenderableLine) {
        if line.has_content() {
            self.lines.push(line);
        } else if !line.is_empty() {
            html_trace_quiet!("Dropping blank line {:?}", line.text());
        }
    }

    pub fn into_lines(mut self) -> Vec<RenderableLine> {
        let last = mem::replace(
            &mut self.current,
            RenderableLine::new(self.font_height, LineType::Text),
        );
        self.finish(last);
        self.lines
    }
}
