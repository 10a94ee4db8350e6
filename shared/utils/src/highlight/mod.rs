//! Placing assistant-chosen phrases back into OCR page text.
//!
//! OCR output rarely reproduces a phrase byte for byte: spacing drifts,
//! words break across lines, shorthand like `B12` gets split and digits may
//! come back in Persian script. [`HighlightMatcher`] runs a cascade of
//! progressively looser strategies and wraps the first free occurrence of
//! each phrase in category markup.

pub mod digits;
pub mod matcher;
pub mod strategies;

/// Stand-in for `\n` while matching. One byte wide, so match offsets line up
/// with the original page text.
pub const NEWLINE_SENTINEL: char = '\u{1E}';
pub(crate) const NEWLINE_SENTINEL_STR: &str = "\u{1E}";

pub use matcher::{
    annotate, AnnotatedSegment, Annotation, HighlightMatcher, MatchStats, MatcherOptions, Placement,
};
pub use strategies::{MatchStrategy, Span};
