use spendwise_core::MatchMode;

use crate::taxonomy::{normalize_keyword, Category, Taxonomy};
use crate::text::contains_whole_word;

/// Deterministic keyword classifier over a taxonomy snapshot.
///
/// Categories are tested in declaration order and the first one with a
/// matching phrase wins. The result depends only on the snapshot, the match
/// mode and the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleMatcher {
    mode: MatchMode,
}

impl RuleMatcher {
    pub fn new(mode: MatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Returns the first category whose keywords occur in `text`, or `None`.
    pub fn find_match<'a>(&self, text: &str, taxonomy: &'a Taxonomy) -> Option<&'a Category> {
        // Same normalisation as keywords, so "Ice  Cream" meets "ice cream".
        let text = normalize_keyword(text);
        if text.is_empty() {
            return None;
        }
        taxonomy
            .categories()
            .iter()
            .find(|c| c.keywords.iter().any(|kw| self.phrase_matches(&text, kw)))
    }

    fn phrase_matches(&self, text: &str, phrase: &str) -> bool {
        match self.mode {
            MatchMode::Substring => text.contains(phrase),
            MatchMode::WholeWord => contains_whole_word(text, phrase),
        }
    }
}
