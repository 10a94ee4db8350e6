//! Highlight domain models.
//!
//! A highlight phrase is a span of page text picked out by the study assistant
//! and tagged with one of three fixed categories. Phrases are grouped per page
//! in a [`HighlightsMap`] owned by each document.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use validator::Validate;

/// Semantic tag controlling the visual treatment of a highlighted span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum HighlightCategory {
    /// Critical terms and adverbial qualifiers.
    #[default]
    Key,
    /// The central idea of a passage.
    Main,
    /// Supporting details and examples.
    Detail,
}

impl HighlightCategory {
    pub const ALL: [HighlightCategory; 3] = [Self::Key, Self::Main, Self::Detail];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Main => "main",
            Self::Detail => "detail",
        }
    }

    /// CSS class used when the span is rendered as markup.
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Key => "highlight-key",
            Self::Main => "highlight-main",
            Self::Detail => "highlight-detail",
        }
    }

    /// Lenient parse used when ingesting assistant output. Anything that is
    /// not a known category becomes [`HighlightCategory::Key`].
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "main" => Self::Main,
            "detail" | "details" => Self::Detail,
            _ => Self::Key,
        }
    }
}

impl From<String> for HighlightCategory {
    fn from(value: String) -> Self {
        Self::parse_lenient(&value)
    }
}

impl From<HighlightCategory> for String {
    fn from(value: HighlightCategory) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for HighlightCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phrase to highlight on one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct HighlightPhrase {
    #[validate(length(min = 1, max = 2000, message = "Highlight text must be between 1 and 2000 characters"))]
    pub text: String,
    #[serde(rename = "type", default)]
    pub category: HighlightCategory,
}

impl HighlightPhrase {
    pub fn new(text: impl Into<String>, category: HighlightCategory) -> Self {
        Self {
            text: text.into(),
            category,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Trims every phrase, drops blank ones and removes duplicates by text.
    /// The first occurrence of a duplicated text keeps its category.
    pub fn sanitize(phrases: Vec<HighlightPhrase>) -> Vec<HighlightPhrase> {
        let mut seen = HashSet::new();
        phrases
            .into_iter()
            .filter_map(|phrase| {
                let text = phrase.text.trim();
                if text.is_empty() || !seen.insert(text.to_string()) {
                    return None;
                }
                Some(HighlightPhrase::new(text, phrase.category))
            })
            .collect()
    }
}

/// Highlights of a document keyed by 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct HighlightsMap(BTreeMap<u32, Vec<HighlightPhrase>>);

impl HighlightsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page: u32) -> &[HighlightPhrase] {
        self.0.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replaces the highlights of `page` with the sanitized `phrases`,
    /// leaving every other page untouched. An empty result removes the page.
    pub fn merge_page(&mut self, page: u32, phrases: Vec<HighlightPhrase>) {
        let phrases = HighlightPhrase::sanitize(phrases);
        if phrases.is_empty() {
            self.0.remove(&page);
        } else {
            self.0.insert(page, phrases);
        }
    }

    pub fn clear_page(&mut self, page: u32) -> Option<Vec<HighlightPhrase>> {
        self.0.remove(&page)
    }

    /// Drops highlights for pages beyond `page_count`, used after the OCR
    /// text of a document was replaced with a shorter one.
    pub fn retain_pages(&mut self, page_count: usize) {
        self.0.retain(|page, _| (*page as usize) <= page_count && *page >= 1);
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &[HighlightPhrase])> {
        self.0.iter().map(|(page, phrases)| (*page, phrases.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn phrase_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl FromIterator<(u32, Vec<HighlightPhrase>)> for HighlightsMap {
    fn from_iter<I: IntoIterator<Item = (u32, Vec<HighlightPhrase>)>>(iter: I) -> Self {
        let mut map = HighlightsMap::new();
        for (page, phrases) in iter {
            map.merge_page(page, phrases);
        }
        map
    }
}
