//! The wiki the descriptions come from, as seen by the renderer.
//!
//! Fetching and scraping pages is up to the host; this module only fixes
//! the shapes of the data and a few helpers for presenting search results.

use crate::render::FontMetrics;
use crate::{HtmlRenderer, Result};

/// Stand-in source name used by the wiki for vanilla or unattributed items.
pub const UNKNOWN_SOURCE: &str = "vanilla_or_unknown";

/// One hit of a wiki search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    /// Item name
    pub name: String,
    /// Name of the mod the item comes from (may be empty or
    /// [`UNKNOWN_SOURCE`])
    pub source: String,
    /// Absolute URL of the item page
    pub url: String,
}

impl SearchResult {
    /// Build a result from a search link's text, which looks like
    /// `Name (English name) - Mod name (ModId)` or just `Name`.
    pub fn from_link_text(text: &str, url: &str) -> SearchResult {
        let head = text.split(" - ").next().unwrap_or("");
        let name = head.split('(').next().unwrap_or("").trim();
        let source = match text.find(" - ") {
            None => UNKNOWN_SOURCE,
            Some(idx) => {
                let part = text[idx + 3..].trim();
                part.strip_prefix('(')
                    .and_then(|p| p.strip_suffix(')'))
                    .unwrap_or(part)
            }
        };
        SearchResult {
            name: name.into(),
            source: source.into(),
            url: url.into(),
        }
    }

    /// The text to show in a list of candidates.
    pub fn display_text(&self) -> String {
        if self.source.is_empty() || self.source == UNKNOWN_SOURCE {
            self.name.clone()
        } else {
            format!("{} ({})", self.name, self.source)
        }
    }
}

/// The details page of one item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemDetails {
    /// Page title
    pub title: String,
    /// Mod name
    pub source: String,
    /// Page URL, also the base for relative links in the body
    pub url: String,
    /// The description, as HTML
    pub body_html: String,
}

impl ItemDetails {
    /// Lay the description out with `renderer`; returns the content height.
    pub fn prepare<F: FontMetrics>(&self, renderer: &mut HtmlRenderer<F>, width: f32) -> f32 {
        renderer.prepare(&self.body_html, width, Some(&self.url))
    }
}

/// What a lookup produced: either the item itself, or candidates to pick
/// from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchResult {
    /// An exact hit.
    Item(ItemDetails),
    /// Several possible items.
    Candidates(Vec<SearchResult>),
}

/// A wiki which can be searched.  Implementations block, so hosts call
/// them off the render thread.
pub trait WikiSource {
    /// Search for `term`.
    fn search(&self, term: &str) -> Result<Vec<SearchResult>>;

    /// Fetch the page at `url`.
    fn fetch_details(&self, url: &str) -> Result<ItemDetails>;

    /// Search, and fetch the page straight away if exactly one result
    /// matches `term` exactly.
    fn lookup(&self, term: &str) -> Result<FetchResult> {
        let results = prioritize_results(term, self.search(term)?);
        let wanted = term.trim().to_lowercase();
        let exact = results
            .iter()
            .filter(|r| r.name.to_lowercase() == wanted)
            .count();
        match results.first() {
            Some(first) if exact == 1 => Ok(FetchResult::Item(self.fetch_details(&first.url)?)),
            _ => Ok(FetchResult::Candidates(results)),
        }
    }
}

/// Move results whose name is exactly `term` (ignoring case) to the front,
/// keeping the order otherwise.
pub fn prioritize_results(term: &str, results: Vec<SearchResult>) -> Vec<SearchResult> {
    let term = term.trim().to_lowercase();
    let (mut exact, broad): (Vec<_>, Vec<_>) = results
        .into_iter()
        .partition(|r| r.name.to_lowercase() == term);
    exact.extend(broad);
    exact
}
