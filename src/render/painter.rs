//! Drawing finished lines, and the vertical metrics shared by drawing,
//! hit-testing and content height.

use super::line::{Colour, LineType, RenderableLine, RenderablePart};
use super::{Canvas, Rect};
use crate::images::TextureRef;

/// Title background box.
const TITLE_BACKGROUND: Colour = Colour::from_argb(0x22151518);
const TITLE_PAD_X: f32 = 3.0;
const TITLE_PAD_Y: f32 = 2.0;
/// Title underline.
const UNDERLINE: Colour = Colour::from_argb(0x33454A53);
const UNDERLINE_FADE_ALPHA: f32 = 68.0;
const UNDERLINE_FADE_WIDTH: f32 = 16.0;
/// Minimum underline length, as a share of the panel width.
const UNDERLINE_MIN_SHARE: f32 = 0.6;

/// Scale and spacing rules for laid-out lines.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineMetrics {
    /// Base draw scale (font units to screen pixels).
    pub scale: f32,
    /// Multiplier on each line's scaled height.
    pub line_spacing: f32,
}

impl LineMetrics {
    /// The full scale a line of this type is drawn at.
    pub fn effective_scale(&self, line_type: LineType) -> f32 {
        self.scale * line_type.scale()
    }

    /// The on-screen height of a line, spacing included but without its
    /// bottom margin.
    pub fn scaled_height(&self, line: &RenderableLine) -> f32 {
        line.height() * self.effective_scale(line.line_type()) * self.line_spacing
    }

    /// How far the cursor moves down after line `index`.
    ///
    /// An image line directly followed by a caption skips its spacing and
    /// margin so the caption sits right under the image.
    pub fn advance(&self, lines: &[RenderableLine], index: usize) -> f32 {
        let line = &lines[index];
        let hugs_caption = line.line_type() == LineType::Image
            && lines.get(index + 1).is_some_and(RenderableLine::is_caption);
        if hugs_caption {
            line.height() * self.effective_scale(line.line_type())
        } else {
            self.scaled_height(line)
                + line.margin_bottom() * self.effective_scale(line.line_type())
        }
    }

    /// Total height of all lines.
    pub fn content_height(&self, lines: &[RenderableLine]) -> f32 {
        (0..lines.len()).map(|i| self.advance(lines, i)).sum()
    }

    /// Horizontal offset of a line within a panel `max_width` wide (already
    /// width-corrected).  Images and captions are centred.
    pub fn x_offset(&self, line: &RenderableLine, max_width: f32) -> f32 {
        match line.line_type() {
            LineType::Image | LineType::Caption => {
                let w = line.total_width() * self.effective_scale(line.line_type());
                ((max_width - w) / 2.0).max(0.0)
            }
            LineType::Text | LineType::Title => 0.0,
        }
    }

    /// Screen-space horizontal extents of each part of a line drawn with
    /// its left edge at `left`.
    pub fn part_spans<'l>(
        &self,
        line: &'l RenderableLine,
        left: f32,
    ) -> impl Iterator<Item = (f32, f32, &'l RenderablePart)> + 'l {
        let s = self.effective_scale(line.line_type());
        let mut x = left;
        line.parts().iter().map(move |part| {
            let x0 = x;
            x += part.width() * s;
            (x0, x, part)
        })
    }
}

/// Draws single lines onto a [`Canvas`].
#[derive(Clone, Copy, Debug)]
pub struct Painter {
    /// Line scale and spacing.
    pub metrics: LineMetrics,
    /// Height of a line of the font, in font units.
    pub font_height: f32,
    /// Width-corrected panel width in screen pixels.
    pub max_width: f32,
}

impl Painter {
    /// Draw `line` with its top-left corner at `(x, y)`.
    pub fn paint_line<C: Canvas + ?Sized>(&self, canvas: &mut C, line: &RenderableLine, x: f32, y: f32) {
        let s = self.metrics.effective_scale(line.line_type());
        let dx = x + self.metrics.x_offset(line, self.max_width);
        canvas.push_transform(dx, y, s);
        if line.line_type() == LineType::Title {
            self.paint_title_decoration(canvas, line, s);
        }
        let mut cx = 0.0;
        for part in line.parts() {
            match part {
                RenderablePart::Styled(text) => {
                    let ty = (line.height() - self.font_height) / 2.0;
                    canvas.draw_text(text.text(), cx, ty, text.style());
                }
                RenderablePart::Image(image) => {
                    let iy = (line.height() - image.draw_height()) / 2.0;
                    let texture = image.texture();
                    let uv = match texture {
                        TextureRef::Sprite(icon) => Some(icon.uv),
                        TextureRef::Pending | TextureRef::Loaded(_) => None,
                    };
                    canvas.draw_texture(
                        texture,
                        cx,
                        iy,
                        image.draw_width(),
                        image.draw_height(),
                        uv,
                    );
                }
            }
            cx += part.width();
        }
        canvas.pop_transform();
    }

    /// A faint box behind the title and an underline which fades out at
    /// its right end.  Coordinates are in the line's scaled space.
    fn paint_title_decoration<C: Canvas + ?Sized>(&self, canvas: &mut C, line: &RenderableLine, s: f32) {
        let h = line.height();
        canvas.fill_rect(
            Rect::new(
                -TITLE_PAD_X,
                -TITLE_PAD_Y,
                line.total_width() + 2.0 * TITLE_PAD_X,
                h + 2.0 * TITLE_PAD_Y - 1.0,
            ),
            TITLE_BACKGROUND,
        );

        let width = line
            .total_width()
            .max((self.max_width / s * UNDERLINE_MIN_SHARE).floor());
        let uy = h + 1.0;
        let fade = UNDERLINE_FADE_WIDTH.min(width).floor();
        let solid = width - fade;
        if solid > 0.0 {
            canvas.fill_rect(Rect::new(0.0, uy, solid, 1.0), UNDERLINE);
        }
        let steps = fade as u32;
        for i in 0..steps {
            let t = i as f32 / fade;
            let alpha = (UNDERLINE_FADE_ALPHA * (1.0 - t)) as u8;
            canvas.fill_rect(
                Rect::new(solid + i as f32, uy, 1.0, 1.0),
                UNDERLINE.with_alpha(alpha),
            );
        }
    }
}
