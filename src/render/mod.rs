//! Module containing the host capability interfaces used for measuring and
//! drawing, and the layout engine built on them.

pub mod cell_metrics;
pub mod html_renderer;
pub mod layout;
pub mod line;
pub mod painter;

use crate::images::TextureRef;
use self::line::{Colour, Style};

/// A font at a fixed base size.
///
/// All layout happens in the unscaled units of this font; per-line scale
/// factors are applied on top when drawing.
pub trait FontMetrics {
    /// The advance width of `text`.
    fn width(&self, text: &str) -> f32;

    /// The height of one line of text.
    fn line_height(&self) -> f32;
}

impl<F: FontMetrics + ?Sized> FontMetrics for &F {
    fn width(&self, text: &str) -> f32 {
        (**self).width(text)
    }

    fn line_height(&self) -> f32 {
        (**self).line_height()
    }
}

/// An axis-aligned rectangle in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width
    pub w: f32,
    /// Height
    pub h: f32,
}

impl Rect {
    /// Construct a rectangle.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Rect {
        Rect { x, y, w, h }
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    /// True if the point is inside (right and bottom edges excluded).
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.bottom()
    }
}

/// A sub-rectangle of a texture, in texels, together with the texture's
/// full size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UvRect {
    /// Left texel
    pub u: u32,
    /// Top texel
    pub v: u32,
    /// Width in texels
    pub w: u32,
    /// Height in texels
    pub h: u32,
    /// Width of the whole texture
    pub texture_width: u32,
    /// Height of the whole texture
    pub texture_height: u32,
}

/// A drawing surface with a transform stack and a clip rectangle.
///
/// Coordinates passed to the drawing methods are transformed by every
/// transform currently pushed; the clip rectangle is in untransformed
/// screen coordinates.
pub trait Canvas {
    /// Push a transform: translate by `(dx, dy)` then scale uniformly.
    fn push_transform(&mut self, dx: f32, dy: f32, scale: f32);

    /// Undo the most recent `push_transform`.
    fn pop_transform(&mut self);

    /// Restrict drawing to `rect`.
    fn enable_clip(&mut self, rect: Rect);

    /// Remove the clip rectangle.
    fn disable_clip(&mut self);

    /// Draw a run of text with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f32, y: f32, style: &Style);

    /// Draw a texture (or a placeholder for `TextureRef::Pending`).
    fn draw_texture(
        &mut self,
        texture: TextureRef,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        uv: Option<UvRect>,
    );

    /// Fill a rectangle with a solid colour.
    fn fill_rect(&mut self, rect: Rect, colour: Colour);
}
