use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

use studylens_models::{HighlightCategory, HighlightPhrase};

use super::strategies::{Haystack, MatchStrategy, Span, CASCADE};
use super::NEWLINE_SENTINEL_STR;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherOptions {
    /// Shortest word the fuzzy single-word strategy will try.
    pub fuzzy_min_chars: usize,
    /// Compiled size limit for every pattern built from a phrase.
    pub regex_size_limit: usize,
}

impl Default for MatcherOptions {
    fn default() -> Self {
        Self {
            fuzzy_min_chars: 4,
            regex_size_limit: 1 << 20,
        }
    }
}

/// Where a phrase ended up and which strategy found it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub phrase: String,
    pub category: HighlightCategory,
    pub strategy: MatchStrategy,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub matched: usize,
    pub unmatched: usize,
    pub skipped_blank: usize,
    pub duplicates: usize,
    pub faults: usize,
}

/// A run of page text, highlighted or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedSegment {
    pub text: String,
    pub category: Option<HighlightCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Page text with `<span class="highlight-…">` wrappers inserted.
    pub text: String,
    pub segments: Vec<AnnotatedSegment>,
    pub placements: Vec<Placement>,
    pub stats: MatchStats,
}

/// Annotates with default options.
pub fn annotate(page_text: &str, phrases: &[HighlightPhrase]) -> Annotation {
    HighlightMatcher::default().annotate(page_text, phrases)
}

#[derive(Debug, Clone, Default)]
pub struct HighlightMatcher {
    options: MatcherOptions,
}

impl HighlightMatcher {
    pub fn new(options: MatcherOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MatcherOptions {
        &self.options
    }

    /// Locates every phrase in `page_text` and wraps the first free
    /// occurrence of each. Longer phrases claim their span first; a phrase
    /// that no strategy can place is dropped and counted.
    pub fn annotate(&self, page_text: &str, phrases: &[HighlightPhrase]) -> Annotation {
        let mut stats = MatchStats::default();

        // One-byte sentinel, so offsets into `working` are offsets into `page_text`.
        let working = page_text.replace('\n', NEWLINE_SENTINEL_STR);

        let mut ordered: Vec<&HighlightPhrase> = phrases.iter().collect();
        ordered.sort_by_key(|phrase| Reverse(phrase.text.trim().chars().count()));

        let mut seen = HashSet::new();
        let mut claimed: Vec<Span> = Vec::new();
        let mut placements: Vec<Placement> = Vec::new();

        for phrase in ordered {
            let text = phrase.text.trim();
            if text.is_empty() {
                stats.skipped_blank += 1;
                continue;
            }
            if !seen.insert(text) {
                stats.duplicates += 1;
                continue;
            }

            let needle = text.replace('\n', NEWLINE_SENTINEL_STR);
            match self.locate(&needle, &working, &claimed) {
                Ok(Some((strategy, span))) => {
                    crate::log_debug!("Placed '{}' via {}", text, strategy.as_str());
                    claimed.push(span);
                    placements.push(Placement {
                        phrase: text.to_string(),
                        category: phrase.category,
                        strategy,
                        span,
                    });
                    stats.matched += 1;
                }
                Ok(None) => {
                    crate::log_debug!("No match for highlight phrase '{}'", text);
                    stats.unmatched += 1;
                }
                Err(error) => {
                    tracing::error!(error = %error, phrase = text, "Highlight pattern failed");
                    stats.faults += 1;
                }
            }
        }

        placements.sort_by_key(|placement| placement.span.start);
        let segments = split_segments(page_text, &placements);
        let text = render_markup(&segments);

        Annotation {
            text,
            segments,
            placements,
            stats,
        }
    }

    fn locate(
        &self,
        needle: &str,
        working: &str,
        claimed: &[Span],
    ) -> Result<Option<(MatchStrategy, Span)>, regex::Error> {
        let haystack = Haystack::new(
            working,
            claimed,
            self.options.fuzzy_min_chars,
            self.options.regex_size_limit,
        );
        for (kind, strategy) in CASCADE.iter() {
            if let Some(span) = strategy(needle, &haystack)? {
                return Ok(Some((*kind, span)));
            }
        }
        Ok(None)
    }
}

fn split_segments(page_text: &str, placements: &[Placement]) -> Vec<AnnotatedSegment> {
    let mut segments = Vec::with_capacity(placements.len() * 2 + 1);
    let mut cursor = 0;
    for placement in placements {
        let Span { start, end } = placement.span;
        if start > cursor {
            segments.push(AnnotatedSegment {
                text: page_text[cursor..start].to_string(),
                category: None,
            });
        }
        segments.push(AnnotatedSegment {
            text: page_text[start..end].to_string(),
            category: Some(placement.category),
        });
        cursor = end;
    }
    if cursor < page_text.len() {
        segments.push(AnnotatedSegment {
            text: page_text[cursor..].to_string(),
            category: None,
        });
    }
    segments
}

fn render_markup(segments: &[AnnotatedSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment.category {
            Some(category) => {
                out.push_str("<span class=\"");
                out.push_str(category.css_class());
                out.push_str("\">");
                out.push_str(&segment.text);
                out.push_str("</span>");
            }
            None => out.push_str(&segment.text),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phrase(text: &str, category: HighlightCategory) -> HighlightPhrase {
        HighlightPhrase::new(text, category)
    }

    #[test]
    fn test_longest_phrase_claims_first() {
        let phrases = vec![
            phrase("heart", HighlightCategory::Key),
            phrase("heart rate", HighlightCategory::Main),
        ];
        let annotation = annotate("Resting heart rate drops.", &phrases);

        assert_eq!(
            annotation.text,
            "Resting <span class=\"highlight-main\">heart rate</span> drops."
        );
        assert_eq!(annotation.stats.matched, 1);
        assert_eq!(annotation.stats.unmatched, 1);
    }

    #[test]
    fn test_category_wrapping_leaves_rest_untouched() {
        let annotation = annotate(
            "The main idea is gravity.",
            &[phrase("main idea", HighlightCategory::Main)],
        );
        assert_eq!(
            annotation.text,
            "The <span class=\"highlight-main\">main idea</span> is gravity."
        );
        assert_eq!(annotation.text.matches("highlight-main").count(), 1);
    }

    #[test]
    fn test_no_match_returns_input() {
        let text = "Photosynthesis happens in chloroplasts.";
        let annotation = annotate(text, &[phrase("nonexistent phrase xyz", HighlightCategory::Key)]);
        assert_eq!(annotation.text, text);
        assert_eq!(annotation.stats.unmatched, 1);
        assert!(annotation.placements.is_empty());
    }

    #[test]
    fn test_empty_phrase_list_keeps_line_breaks() {
        let text = "line one\nline two\n\nline four\n";
        let annotation = annotate(text, &[]);
        assert_eq!(annotation.text, text);
        assert_eq!(annotation.segments.len(), 1);
    }

    #[test]
    fn test_multi_line_match_preserves_line_break() {
        let text = "the cardiac\noutput rises";
        let annotation = annotate(text, &[phrase("cardiac output", HighlightCategory::Detail)]);
        assert_eq!(
            annotation.text,
            "the <span class=\"highlight-detail\">cardiac\noutput</span> rises"
        );
        assert_eq!(annotation.placements[0].strategy, MatchStrategy::FlexibleWhitespace);
    }

    #[test]
    fn test_digit_script_bridging() {
        let annotation = annotate("نمره نهایی ۳/۶ بود", &[phrase("3/6", HighlightCategory::Key)]);
        assert_eq!(
            annotation.text,
            "نمره نهایی <span class=\"highlight-key\">۳/۶</span> بود"
        );
        assert_eq!(annotation.placements[0].strategy, MatchStrategy::DigitScript);

        let annotation = annotate("final score 3/6", &[phrase("۳/۶", HighlightCategory::Key)]);
        assert_eq!(
            annotation.text,
            "final score <span class=\"highlight-key\">3/6</span>"
        );
    }

    #[test]
    fn test_only_first_occurrence_is_wrapped() {
        let annotation = annotate("cell by cell", &[phrase("cell", HighlightCategory::Key)]);
        assert_eq!(
            annotation.text,
            "<span class=\"highlight-key\">cell</span> by cell"
        );
    }

    #[test]
    fn test_blank_and_duplicate_phrases_are_counted() {
        let phrases = vec![
            phrase("  ", HighlightCategory::Key),
            phrase("osmosis", HighlightCategory::Main),
            phrase(" osmosis ", HighlightCategory::Detail),
        ];
        let annotation = annotate("osmosis and osmosis", &phrases);
        assert_eq!(annotation.stats.skipped_blank, 1);
        assert_eq!(annotation.stats.duplicates, 1);
        assert_eq!(annotation.stats.matched, 1);
        assert_eq!(annotation.placements[0].category, HighlightCategory::Main);
    }

    #[test]
    fn test_fault_in_one_phrase_does_not_stop_the_page() {
        let matcher = HighlightMatcher::new(MatcherOptions {
            fuzzy_min_chars: 4,
            regex_size_limit: 10_000,
        });
        let long_phrase = "z".repeat(5000);
        let phrases = vec![
            phrase(&long_phrase, HighlightCategory::Key),
            phrase("ok", HighlightCategory::Main),
        ];
        let annotation = matcher.annotate("it is ok", &phrases);
        assert_eq!(annotation.stats.faults, 1);
        assert_eq!(annotation.stats.matched, 1);
        assert!(annotation.text.contains("<span class=\"highlight-main\">ok</span>"));
    }

    #[test]
    fn test_segments_cover_the_page() {
        let text = "Mitochondria produce ATP.\nRibosomes make proteins.";
        let phrases = vec![
            phrase("ATP", HighlightCategory::Key),
            phrase("Ribosomes", HighlightCategory::Detail),
        ];
        let annotation = annotate(text, &phrases);
        let joined: String = annotation.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(joined, text);
        assert_eq!(
            annotation
                .segments
                .iter()
                .filter(|s| s.category.is_some())
                .count(),
            2
        );
    }

    #[test]
    fn test_input_phrases_are_not_reordered() {
        let phrases = vec![
            phrase("a", HighlightCategory::Key),
            phrase("longer phrase", HighlightCategory::Main),
        ];
        let before = phrases.clone();
        let _ = annotate("a longer phrase", &phrases);
        assert_eq!(phrases, before);
    }
}
