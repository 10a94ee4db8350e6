//! Page segmentation of OCR text blobs.
//!
//! The OCR step emits one blob per document in which every page is introduced
//! by a marker line such as `===== Page 3 =====`. Segmentation never fails:
//! a blob without markers degrades to a single page and an empty blob to no
//! pages at all.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{StudyError, StudyResult};
use crate::highlight::digits::to_western;
use crate::validation::validate_page_number;

pub const DEFAULT_PAGE_LABEL: &str = "Page";

static DEFAULT_SEGMENTER: Lazy<PageSegmenter> = Lazy::new(PageSegmenter::default);

/// Splits with the default `Page` label.
pub fn segment(raw: &str) -> Vec<String> {
    DEFAULT_SEGMENTER.segment(raw)
}

/// Rebuilds a blob with the default `Page` label.
pub fn reconstruct<S: AsRef<str>>(pages: &[S]) -> String {
    DEFAULT_SEGMENTER.reconstruct(pages)
}

#[derive(Debug, Clone)]
pub struct PageSegmenter {
    label: String,
    marker: Regex,
}

impl PageSegmenter {
    pub fn new(label: &str) -> StudyResult<Self> {
        let label = label.trim();
        if label.is_empty() {
            return Err(StudyError::configuration("page label must not be empty"));
        }
        let marker = marker_regex(label)
            .map_err(|e| StudyError::configuration(format!("invalid page label: {}", e)))?;
        Ok(Self {
            label: label.to_string(),
            marker,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn segment(&self, raw: &str) -> Vec<String> {
        self.marker
            .split(raw)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Segments `raw` and records the markers seen, logging a warning when
    /// the marker count and the recovered page count disagree.
    pub fn segment_with_report(&self, raw: &str) -> Segmentation {
        let marker_numbers = self
            .marker
            .captures_iter(raw)
            .map(|caps| to_western(&caps[1]).parse::<u64>().ok())
            .collect();

        let segmentation = Segmentation {
            pages: self.segment(raw),
            marker_numbers,
        };

        if let Some(warning) = segmentation.warning() {
            crate::log_warn!("Page segmentation anomaly: {}", warning);
        }
        segmentation
    }

    pub fn count_markers(&self, text: &str) -> usize {
        self.marker.find_iter(text).count()
    }

    pub fn marker_line(&self, page_number: usize) -> String {
        format!("===== {} {} =====", self.label, page_number)
    }

    pub fn reconstruct<S: AsRef<str>>(&self, pages: &[S]) -> String {
        let mut raw = String::new();
        for (index, page) in pages.iter().enumerate() {
            raw.push_str(&self.marker_line(index + 1));
            raw.push('\n');
            raw.push_str(page.as_ref());
            raw.push('\n');
        }
        raw
    }

    pub fn paged(&self, raw: &str) -> PagedDocument {
        let segmentation = self.segment_with_report(raw);
        PagedDocument {
            segmenter: self.clone(),
            pages: segmentation.pages,
        }
    }
}

impl Default for PageSegmenter {
    fn default() -> Self {
        Self {
            label: DEFAULT_PAGE_LABEL.to_string(),
            marker: marker_regex(DEFAULT_PAGE_LABEL).expect("default page marker pattern"),
        }
    }
}

/// Marker line pattern for `label`, capturing the page number in group 1.
fn marker_regex(label: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"(?i)={{3,}}[ \t]*{}[ \t]+(\d+)[ \t]*={{3,}}",
        regex::escape(label)
    ))
}

/// Result of segmenting a blob along with the marker bookkeeping needed to
/// detect lost or empty pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    pub pages: Vec<String>,
    /// Number of each marker in blob order, `None` when it does not fit a `u64`.
    pub marker_numbers: Vec<Option<u64>>,
}

impl Segmentation {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn marker_count(&self) -> usize {
        self.marker_numbers.len()
    }

    /// A marker-free blob is consistent when it yields at most one page.
    pub fn is_consistent(&self) -> bool {
        if self.marker_numbers.is_empty() {
            self.pages.len() <= 1
        } else {
            self.marker_numbers.len() == self.pages.len()
        }
    }

    /// Unreadable marker numbers are left out of the comparison.
    pub fn markers_in_order(&self) -> bool {
        let numbers: Vec<u64> = self.marker_numbers.iter().flatten().copied().collect();
        numbers.windows(2).all(|w| w[0] < w[1])
    }

    pub fn warning(&self) -> Option<String> {
        let mut problems = Vec::new();
        if !self.is_consistent() {
            problems.push(format!(
                "found {} page markers but {} non-empty pages",
                self.marker_count(),
                self.page_count()
            ));
        }
        if !self.markers_in_order() {
            problems.push("page markers are not in increasing order".to_string());
        }
        if problems.is_empty() {
            None
        } else {
            Some(problems.join("; "))
        }
    }
}

/// Pages of one document held for a viewing or editing session. Every edit
/// goes back to the blob through [`PagedDocument::to_raw`].
#[derive(Debug, Clone)]
pub struct PagedDocument {
    segmenter: PageSegmenter,
    pages: Vec<String>,
}

impl PagedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Looks up a 1-based page. Numbers outside `1..=page_count` are an
    /// explicit [`StudyError::OutOfRange`], never clamped.
    pub fn page(&self, page_number: i64) -> StudyResult<&str> {
        let index = validate_page_number(page_number, self.pages.len())?;
        Ok(&self.pages[index - 1])
    }

    pub fn replace_page(&mut self, page_number: i64, text: &str) -> StudyResult<()> {
        let index = validate_page_number(page_number, self.pages.len())?;
        let text = text.trim();
        if text.is_empty() {
            return Err(StudyError::validation("text", "Page text must not be empty"));
        }
        if self.segmenter.count_markers(text) > 0 {
            return Err(StudyError::validation(
                "text",
                "Page text must not contain page markers",
            ));
        }
        self.pages[index - 1] = text.to_string();
        Ok(())
    }

    pub fn to_raw(&self) -> String {
        self.segmenter.reconstruct(&self.pages)
    }
}
