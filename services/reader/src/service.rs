//! Reader Service
//!
//! Orchestrates upload, OCR, page access, highlight generation and chat for
//! stored study documents. Every change to the page text goes through the
//! segmenter and back into one blob, so the stored text and the pages a
//! client sees never drift apart.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use studylens_database::DocumentStore;
use studylens_models::{ChatMessage, HighlightPhrase, HighlightsMap, StudyDocument};
use studylens_utils::{
    content_type_for, resolve_page_number, validate_file_size, validate_file_type,
    validate_page_number, Annotation, HighlightMatcher, MatchStats, PageSegmenter, PagedDocument,
    ReaderConfig, Segmentation, StudyError, StudyResult,
};

use crate::metrics::ReaderMetrics;
use crate::vlm_client::{OcrEngine, StudyAssistant};

/// How the OCR blob of a document split into pages.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationReport {
    pub page_count: usize,
    pub marker_count: usize,
    pub warning: Option<String>,
}

impl From<&Segmentation> for SegmentationReport {
    fn from(segmentation: &Segmentation) -> Self {
        Self {
            page_count: segmentation.page_count(),
            marker_count: segmentation.marker_count(),
            warning: segmentation.warning(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document: StudyDocument,
    pub segmentation: SegmentationReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub page: u32,
    pub page_count: usize,
    pub text: String,
    pub highlights: Vec<HighlightPhrase>,
    pub annotation: Annotation,
}

#[derive(Debug, Clone, Serialize)]
pub struct HighlightOutcome {
    pub page: u32,
    pub highlights: Vec<HighlightPhrase>,
    pub stats: MatchStats,
    pub annotated_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub answer: String,
    /// Page the question referred to, when it named one.
    pub page: Option<u32>,
}

pub struct ReaderService {
    store: Arc<dyn DocumentStore>,
    ocr: Arc<dyn OcrEngine>,
    assistant: Arc<dyn StudyAssistant>,
    segmenter: PageSegmenter,
    matcher: HighlightMatcher,
    config: ReaderConfig,
    metrics: Arc<ReaderMetrics>,
}

impl ReaderService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        ocr: Arc<dyn OcrEngine>,
        assistant: Arc<dyn StudyAssistant>,
        config: ReaderConfig,
        metrics: Arc<ReaderMetrics>,
    ) -> StudyResult<Self> {
        Ok(Self {
            store,
            ocr,
            assistant,
            segmenter: PageSegmenter::new(&config.page_label)?,
            matcher: HighlightMatcher::new(config.matcher.clone()),
            config,
            metrics,
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Stores a new upload and runs OCR on it. A failed OCR leaves the
    /// document stored with status `Failed`.
    pub async fn ingest(
        &self,
        file_name: &str,
        declared_content_type: Option<&str>,
        data: &[u8],
    ) -> StudyResult<IngestOutcome> {
        validate_file_type(file_name, &self.config.allowed_file_types)?;
        validate_file_size(data.len() as u64, self.config.max_upload_bytes)?;

        let content_type = content_type_for(file_name, declared_content_type);
        let mut document = StudyDocument::new(file_name, content_type);
        document.processing_status = studylens_models::ProcessingStatus::Processing;
        self.store.save(&document).await?;
        tracing::info!(document_id = %document.id, file_name, "Document uploaded");

        let segmentation = self.run_ocr(&mut document, data).await?;
        Ok(IngestOutcome {
            document,
            segmentation,
        })
    }

    /// Runs OCR again on a fresh copy of the file and replaces the whole blob.
    pub async fn rerun_ocr(
        &self,
        id: Uuid,
        file_name: &str,
        declared_content_type: Option<&str>,
        data: &[u8],
    ) -> StudyResult<IngestOutcome> {
        validate_file_type(file_name, &self.config.allowed_file_types)?;
        validate_file_size(data.len() as u64, self.config.max_upload_bytes)?;

        let mut document = self.document(id).await?;
        document.content_type = content_type_for(file_name, declared_content_type);
        document.file_name = file_name.to_string();

        let segmentation = self.run_ocr(&mut document, data).await?;
        Ok(IngestOutcome {
            document,
            segmentation,
        })
    }

    async fn run_ocr(&self, document: &mut StudyDocument, data: &[u8]) -> StudyResult<SegmentationReport> {
        let text = match self
            .ocr
            .extract_text(&document.file_name, &document.content_type, data)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(document_id = %document.id, "OCR failed: {}", e);
                self.metrics
                    .documents_processed
                    .with_label_values(&["failed"])
                    .inc();
                document.mark_failed();
                self.store.save(document).await?;
                return Err(e);
            }
        };

        self.metrics
            .documents_processed
            .with_label_values(&["processed"])
            .inc();
        self.apply_text(document, text).await
    }

    /// Replaces the stored blob wholesale, e.g. after a manual correction.
    pub async fn replace_text(&self, id: Uuid, text: &str) -> StudyResult<IngestOutcome> {
        if text.trim().is_empty() {
            return Err(StudyError::validation("text", "Document text must not be empty"));
        }
        let mut document = self.document(id).await?;
        let segmentation = self.apply_text(&mut document, text.to_string()).await?;
        Ok(IngestOutcome {
            document,
            segmentation,
        })
    }

    async fn apply_text(&self, document: &mut StudyDocument, text: String) -> StudyResult<SegmentationReport> {
        let segmentation = self.segmenter.segment_with_report(&text);
        if segmentation.warning().is_some() {
            self.metrics.segmentation_anomalies.inc();
        }

        document.replace_ocr_text(text);
        document.highlights.retain_pages(segmentation.page_count());
        self.store.save(document).await?;

        tracing::info!(
            document_id = %document.id,
            pages = segmentation.page_count(),
            "Document text stored"
        );
        Ok(SegmentationReport::from(&segmentation))
    }

    pub async fn document(&self, id: Uuid) -> StudyResult<StudyDocument> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| StudyError::not_found(format!("document {}", id)))
    }

    pub async fn delete(&self, id: Uuid) -> StudyResult<()> {
        if self.store.delete(id).await? {
            Ok(())
        } else {
            Err(StudyError::not_found(format!("document {}", id)))
        }
    }

    async fn paged(&self, id: Uuid) -> StudyResult<(StudyDocument, PagedDocument)> {
        let document = self.document(id).await?;
        let paged = self.segmenter.paged(&document.ocr_text);
        Ok((document, paged))
    }

    pub async fn pages(&self, id: Uuid) -> StudyResult<Vec<String>> {
        let (_, paged) = self.paged(id).await?;
        Ok(paged.pages().to_vec())
    }

    /// One page with its stored highlights applied.
    pub async fn page_view(&self, id: Uuid, page: i64) -> StudyResult<PageView> {
        let (document, paged) = self.paged(id).await?;
        self.render_page(&document, &paged, page)
    }

    fn render_page(&self, document: &StudyDocument, paged: &PagedDocument, page: i64) -> StudyResult<PageView> {
        let text = paged.page(page)?;
        let page = page as u32;
        let highlights = document.highlights.get(page).to_vec();
        let annotation = self.matcher.annotate(text, &highlights);

        Ok(PageView {
            page,
            page_count: paged.page_count(),
            text: text.to_string(),
            highlights,
            annotation,
        })
    }

    /// Replaces the text of one page and stores the rebuilt blob.
    pub async fn edit_page(&self, id: Uuid, page: i64, text: &str) -> StudyResult<PageView> {
        let (mut document, mut paged) = self.paged(id).await?;
        paged.replace_page(page, text)?;

        let raw = paged.to_raw();
        self.store.set_ocr_text(id, &raw).await?;
        document.replace_ocr_text(raw);

        tracing::info!(document_id = %id, page, "Page edited");
        self.render_page(&document, &paged, page)
    }

    /// Asks the assistant for highlights on one page and merges them into
    /// the document. Without an explicit page the instruction must name one.
    pub async fn generate_highlights(
        &self,
        id: Uuid,
        instruction: &str,
        page: Option<i64>,
    ) -> StudyResult<HighlightOutcome> {
        let page = match page {
            Some(page) => page,
            None => resolve_page_number(instruction).map(i64::from).ok_or_else(|| {
                StudyError::validation("page", "No page given and none named in the instruction")
            })?,
        };

        let (_, paged) = self.paged(id).await?;
        let text = paged.page(page)?;
        let page = page as u32;

        let phrases = self.assistant.extract_highlights(text, instruction).await?;
        let merged = self.store.merge_page_highlights(id, page, phrases).await?;

        let highlights = merged.get(page).to_vec();
        let annotation = self.matcher.annotate(text, &highlights);
        self.metrics.record_match_stats(&annotation.stats);
        if annotation.stats.unmatched > 0 {
            studylens_utils::log_warn!(
                "{} of {} highlights on page {} not found in the text",
                annotation.stats.unmatched,
                highlights.len(),
                page
            );
        }

        Ok(HighlightOutcome {
            page,
            highlights,
            stats: annotation.stats,
            annotated_text: annotation.text,
        })
    }

    pub async fn highlights(&self, id: Uuid) -> StudyResult<HighlightsMap> {
        Ok(self.document(id).await?.highlights)
    }

    pub async fn clear_highlights(&self, id: Uuid, page: i64) -> StudyResult<Vec<HighlightPhrase>> {
        let (document, paged) = self.paged(id).await?;
        let page = validate_page_number(page, paged.page_count())? as u32;

        let removed = document.highlights.get(page).to_vec();
        self.store.merge_page_highlights(id, page, Vec::new()).await?;
        Ok(removed)
    }

    /// Answers a question about the document. A question naming a page is
    /// answered from that page alone.
    pub async fn chat(&self, id: Uuid, question: &str, history: &[ChatMessage]) -> StudyResult<ChatReply> {
        if question.trim().is_empty() {
            return Err(StudyError::validation("question", "Question must not be empty"));
        }

        let (document, paged) = self.paged(id).await?;
        let page = resolve_page_number(question);
        let context = match page {
            Some(number) => paged.page(i64::from(number))?.to_string(),
            None => truncate_chars(&document.ocr_text, self.config.max_context_chars).to_string(),
        };

        let answer = self.assistant.answer(&context, question, history).await?;
        Ok(ChatReply { answer, page })
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
