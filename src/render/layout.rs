//! Text measurement and line breaking.
//!
//! Text is broken into "words": a maximal run of alphanumeric characters
//! which are not ideographs.  Every ideograph, every punctuation character
//! and every run of whitespace is a word on its own, so CJK text may break
//! anywhere while Latin words are only ever broken when a single word is
//! wider than a whole line.

use fxhash::FxHashMap;

use super::FontMetrics;

/// A piece of a word together with its measured (unscaled) width.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    /// The text of the piece.
    pub text: String,
    /// Its width in font units.
    pub width: f32,
}

/// Returns true for characters which may be broken around freely.
pub fn is_ideographic(c: char) -> bool {
    matches!(c as u32,
        0x2E80..=0x2FDF       // CJK radicals, Kangxi radicals
        | 0x3000..=0x303F     // CJK symbols and punctuation
        | 0x3040..=0x30FF     // Hiragana, Katakana
        | 0x3100..=0x31BF     // Bopomofo, Hangul compatibility jamo
        | 0x31F0..=0x31FF
        | 0x3400..=0x4DBF     // Extension A
        | 0x4E00..=0x9FFF     // Unified ideographs
        | 0xAC00..=0xD7AF     // Hangul syllables
        | 0xF900..=0xFAFF     // Compatibility ideographs
        | 0xFF00..=0xFFEF     // Half/full width forms
        | 0x20000..=0x3FFFF)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() && !is_ideographic(c)
}

/// Break `text` into words.  Whitespace runs come back as a single `" "`.
pub fn split_words(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut word_start: Option<usize> = None;
    let mut in_space = false;
    for (idx, c) in text.char_indices() {
        if is_word_char(c) {
            in_space = false;
            if word_start.is_none() {
                word_start = Some(idx);
            }
            continue;
        }
        if let Some(start) = word_start.take() {
            words.push(&text[start..idx]);
        }
        if c.is_whitespace() {
            if !in_space {
                words.push(" ");
                in_space = true;
            }
        } else {
            in_space = false;
            words.push(&text[idx..idx + c.len_utf8()]);
        }
    }
    if let Some(start) = word_start {
        words.push(&text[start..]);
    }
    words
}

/// Measures and breaks text for one font.
///
/// Measurements and word splits are memoised; the caches are pure
/// optimisations and are cleared by the renderer before every layout.
#[derive(Debug)]
pub struct LayoutEngine<F> {
    font: F,
    width_correction: f32,
    widths: FxHashMap<String, f32>,
    splits: FxHashMap<(String, u32), Vec<Segment>>,
}

impl<F: FontMetrics> LayoutEngine<F> {
    /// Create an engine; `width_correction` scales every width budget.
    pub fn new(font: F, width_correction: f32) -> LayoutEngine<F> {
        LayoutEngine {
            font,
            width_correction,
            widths: FxHashMap::default(),
            splits: FxHashMap::default(),
        }
    }

    /// The font being laid out with.
    pub fn font(&self) -> &F {
        &self.font
    }

    /// The width correction factor.
    pub fn width_correction(&self) -> f32 {
        self.width_correction
    }

    /// The budget that wrapping and centring both work against.
    pub fn corrected_max_width(&self, width: f32) -> f32 {
        width * self.width_correction
    }

    /// Drop all cached measurements.
    pub fn clear(&mut self) {
        self.widths.clear();
        self.splits.clear();
    }

    fn space_width(&self) -> f32 {
        let w = self.font.width(" ");
        if w > 0.0 {
            w
        } else {
            1.0
        }
    }

    /// The unscaled width of `text`.  Non-empty text never measures as
    /// zero: a font reporting no width gets a space's width per character.
    pub fn measure(&mut self, text: &str) -> f32 {
        if text.is_empty() {
            return 0.0;
        }
        if let Some(w) = self.widths.get(text) {
            return *w;
        }
        let mut w = self.font.width(text);
        if !(w > 0.0) {
            w = self.space_width() * text.chars().count() as f32;
        }
        self.widths.insert(text.into(), w);
        w
    }

    /// Break `text` into words, then break any word wider than `max_width`
    /// (in font units) into pieces which fit.
    pub fn split_text_to_segments(&mut self, text: &str, max_width: f32) -> Vec<String> {
        let mut segments = Vec::new();
        for word in split_words(text) {
            if word != " " && self.measure(word) > max_width {
                segments.extend(
                    self.segment_by_width(word, max_width)
                        .into_iter()
                        .map(|seg| seg.text),
                );
            } else {
                segments.push(word.to_string());
            }
        }
        segments
    }

    /// Split `word` character by character into pieces no wider than
    /// `max_width` font units.  Each piece holds at least one character, so
    /// this always makes progress.
    pub fn segment_by_width(&mut self, word: &str, max_width: f32) -> Vec<Segment> {
        let key = (word.to_string(), max_width.to_bits());
        if let Some(cached) = self.splits.get(&key) {
            return cached.clone();
        }
        let mut pieces = Vec::new();
        let mut current = String::new();
        let mut current_width = 0.0;
        for c in word.chars() {
            let mut candidate = current.clone();
            candidate.push(c);
            let w = self.measure(&candidate);
            if w > max_width && !current.is_empty() {
                pieces.push(Segment {
                    text: std::mem::take(&mut current),
                    width: current_width,
                });
                current.push(c);
                current_width = self.measure(&current);
            } else {
                current = candidate;
                current_width = w;
            }
        }
        if !current.is_empty() {
            pieces.push(Segment {
                text: current,
                width: current_width,
            });
        }
        html_trace_quiet!("segment_by_width({:?}, {}) -> {:?}", word, max_width, pieces);
        self.splits.insert(key, pieces.clone());
        pieces
    }
}

/// Whether a part `width` wide must go on a new line.  A part is never
/// moved off an empty line.
pub fn should_wrap(cursor_x: f32, width: f32, max_width: f32) -> bool {
    cursor_x > 0.0 && cursor_x + width > max_width
}
