//! Property-based tests for page segmentation and highlight annotation
//!
//! These cover the laws the reader relies on when it moves between the
//! stored OCR blob, individual pages and annotated markup.

use proptest::prelude::*;
use studylens_models::{HighlightCategory, HighlightPhrase};

use crate::highlight::annotate;
use crate::pages::{reconstruct, segment, PageSegmenter};

/// A trimmed, non-empty page body of any characters, including `=` runs,
/// tabs and non-Latin text, that does not itself contain a marker line.
fn arb_page() -> impl Strategy<Value = String> {
    "\\S([\\s\\S]{0,40}\\S)?".prop_filter("page body must not contain a marker", |body| {
        PageSegmenter::default().count_markers(body) == 0
    })
}

fn arb_category() -> impl Strategy<Value = HighlightCategory> {
    prop_oneof![
        Just(HighlightCategory::Key),
        Just(HighlightCategory::Main),
        Just(HighlightCategory::Detail),
    ]
}

prop_compose! {
    fn arb_phrase()(
        text in "[A-Za-z0-9۰-۹/ \n]{0,20}",
        category in arb_category()
    ) -> HighlightPhrase {
        HighlightPhrase::new(text, category)
    }
}

proptest! {
    /// **Property: Segment/reconstruct round trip**
    ///
    /// Rebuilding a blob from trimmed, marker-free pages and segmenting it
    /// again yields the same pages.
    #[test]
    fn property_segment_reconstruct_round_trip(pages in prop::collection::vec(arb_page(), 0..8)) {
        let raw = reconstruct(&pages);
        prop_assert_eq!(segment(&raw), pages);
    }

    /// **Property: One marker per page**
    ///
    /// A reconstructed blob contains exactly as many markers as pages.
    #[test]
    fn property_reconstruct_marker_count(pages in prop::collection::vec(arb_page(), 0..8)) {
        let segmenter = PageSegmenter::default();
        let raw = segmenter.reconstruct(&pages);
        prop_assert_eq!(segmenter.count_markers(&raw), pages.len());
    }

    /// **Property: Annotation never loses text**
    ///
    /// Markup only adds characters and the segments concatenate back to the
    /// page, line breaks included.
    #[test]
    fn property_annotation_preserves_text(
        page in "[A-Za-z0-9۰-۹/ \n]{0,80}",
        phrases in prop::collection::vec(arb_phrase(), 0..6)
    ) {
        let annotation = annotate(&page, &phrases);
        prop_assert!(annotation.text.chars().count() >= page.chars().count());

        let joined: String = annotation.segments.iter().map(|s| s.text.as_str()).collect();
        prop_assert_eq!(joined, page.clone());
        prop_assert_eq!(annotation.text.matches('\n').count(), page.matches('\n').count());
        prop_assert_eq!(annotation.stats.faults, 0);
    }

    /// **Property: Placements never overlap**
    #[test]
    fn property_placements_are_disjoint(
        page in "[a-c ]{0,60}",
        phrases in prop::collection::vec(arb_phrase(), 0..8)
    ) {
        let annotation = annotate(&page, &phrases);
        for pair in annotation.placements.windows(2) {
            prop_assert!(pair[0].span.end <= pair[1].span.start);
        }
    }

    /// **Property: No phrases, no change**
    #[test]
    fn property_empty_phrase_list_is_identity(page in "[^\u{1E}]{0,80}") {
        let annotation = annotate(&page, &[]);
        prop_assert_eq!(annotation.text, page);
    }
}
