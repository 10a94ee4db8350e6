//! # StudyLens Core Domain Models
//!
//! Data model shared by the reader service and the persistence layer.
//!
//! ## Key Models
//!
//! - **StudyDocument**: an uploaded file with its OCR text blob and highlights
//! - **HighlightPhrase**: a phrase to highlight, tagged with a category
//! - **HighlightCategory**: `key`, `main` or `detail`
//! - **HighlightsMap**: highlights of one document keyed by 1-based page number
//! - **ChatMessage**: one turn of a conversation about a document
//!
//! Assistant output is ingested leniently: unknown categories default to
//! `key`, blank phrases are dropped and duplicates removed before storage.

pub mod chat;
pub mod document;
pub mod highlight;


pub use chat::*;
pub use document::*;
pub use highlight::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_creation() {
        let doc = StudyDocument::new("biology.pdf", "application/pdf");
        assert!(!doc.id.to_string().is_empty());
        assert_eq!(doc.processing_status, ProcessingStatus::Uploaded);
        assert!(doc.ocr_text.is_empty());
        assert!(doc.highlights.is_empty());
        assert!(doc.is_pdf());
    }

    #[test]
    fn test_replace_ocr_text_marks_processed() {
        let mut doc = StudyDocument::new("scan.png", "image/png");
        let before = doc.updated_at;
        doc.replace_ocr_text("===== Page 1 =====\nhello\n");

        assert_eq!(doc.processing_status, ProcessingStatus::Processed);
        assert!(doc.updated_at >= before);
        assert!(!doc.is_pdf());
    }

    #[test]
    fn test_processing_status_round_trip() {
        for status in [
            ProcessingStatus::Uploaded,
            ProcessingStatus::Processing,
            ProcessingStatus::Processed,
            ProcessingStatus::Failed,
        ] {
            assert_eq!(ProcessingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProcessingStatus::parse("archived"), None);
    }

    #[test]
    fn test_chat_message_serialization() {
        let message = ChatMessage::user("What is on page 2?");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "user");
    }
}
