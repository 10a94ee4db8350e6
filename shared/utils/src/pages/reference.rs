//! Detection of explicit page references in user instructions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::highlight::digits::to_western;

/// Recognised phrasings. Each pattern captures the page number in group 1.
static PAGE_REFERENCE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // "page 3", "go to page 3", "page number 3", "page no. 3", "page #3", "pg 3"
        r"(?i)\b(?:go\s+to\s+)?(?:page|pg\.?)\s*(?:number\s*|no\.?\s*|#\s*)?(\d+)(?:\D|$)",
        // "p. 3"
        r"(?i)\bp\.\s*(\d+)(?:\D|$)",
        // Persian: "صفحه ۳", "صفحه‌ی ۳", "صفحه شماره ۳", "برو به صفحه ۳"
        r"صفحه(?:\x{200C}?ی)?\s*(?:شماره\s*)?(\d+)",
        // Arabic: "الصفحة ٣", "صفحة ٣"
        r"(?:ال)?صفحة\s*(?:رقم\s*)?(\d+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid page reference pattern"))
    .collect()
});

/// Returns the page number referenced by `text`, if any.
///
/// Only the phrasings above are recognised, so stray numbers ("explain the
/// 3 laws") never resolve to a page. When several references are present
/// the earliest readable one in the text wins.
pub fn resolve_page_number(text: &str) -> Option<u32> {
    PAGE_REFERENCE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|caps| {
            let number = caps.get(1)?;
            let page = to_western(number.as_str()).parse::<u32>().ok()?;
            Some((number.start(), page))
        })
        .min_by_key(|(start, _)| *start)
        .map(|(_, page)| page)
}
