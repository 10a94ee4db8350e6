use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::highlight::HighlightsMap;

/// A study document: the uploaded file's identity plus its OCR text blob
/// and the highlights collected for its pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyDocument {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub ocr_text: String,
    pub highlights: HighlightsMap,
    pub processing_status: ProcessingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl StudyDocument {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            ocr_text: String::new(),
            highlights: HighlightsMap::new(),
            processing_status: ProcessingStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the OCR blob wholesale and marks the document processed.
    pub fn replace_ocr_text(&mut self, text: impl Into<String>) {
        self.ocr_text = text.into();
        self.processing_status = ProcessingStatus::Processed;
        self.touch();
    }

    pub fn mark_failed(&mut self) {
        self.processing_status = ProcessingStatus::Failed;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type == "application/pdf" || self.file_name.to_lowercase().ends_with(".pdf")
    }
}

impl Default for StudyDocument {
    fn default() -> Self {
        Self::new("untitled.pdf", "application/pdf")
    }
}
