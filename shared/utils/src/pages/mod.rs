//! Page-indexed view of OCR text.
//!
//! - `segmenter`: split a blob on `===== Page N =====` markers and rebuild it
//! - `reference`: find explicit page references in user instructions

pub mod reference;
pub mod segmenter;

pub use reference::resolve_page_number;
pub use segmenter::{
    reconstruct, segment, PageSegmenter, PagedDocument, Segmentation, DEFAULT_PAGE_LABEL,
};
