pub mod config;
pub mod logging;
pub mod error;
pub mod validation;
pub mod pages;
pub mod highlight;

#[cfg(test)]
pub mod property_tests;

pub use config::*;
pub use logging::*;
pub use error::*;
pub use validation::*;
pub use pages::{
    reconstruct, resolve_page_number, segment, PageSegmenter, PagedDocument, Segmentation,
    DEFAULT_PAGE_LABEL,
};
pub use highlight::{
    annotate, AnnotatedSegment, Annotation, HighlightMatcher, MatchStats, MatchStrategy,
    MatcherOptions, Placement,
};
