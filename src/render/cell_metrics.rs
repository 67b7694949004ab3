//! A font made of fixed-size character cells.

use unicode_width::UnicodeWidthStr;

use super::FontMetrics;

/// Font metrics for a grid of character cells, as on a terminal: every
/// character takes one or two cells according to its Unicode width.
///
/// Handy for headless layout, where no real font is available.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetrics {
    cell_width: f32,
    line_height: f32,
}

impl CellMetrics {
    /// Cells `cell_width` wide on lines `line_height` high.
    pub fn new(cell_width: f32, line_height: f32) -> CellMetrics {
        CellMetrics {
            cell_width,
            line_height,
        }
    }
}

impl Default for CellMetrics {
    /// One unit per cell and per line.
    fn default() -> Self {
        CellMetrics::new(1.0, 1.0)
    }
}

impl FontMetrics for CellMetrics {
    fn width(&self, text: &str) -> f32 {
        UnicodeWidthStr::width(text) as f32 * self.cell_width
    }

    fn line_height(&self) -> f32 {
        self.line_height
    }
}
