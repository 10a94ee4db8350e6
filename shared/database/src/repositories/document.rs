//! Document Repository
//!
//! CRUD operations for study documents. The OCR text is stored as one blob
//! and the highlights map as JSONB keyed by page number.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use studylens_models::{HighlightPhrase, HighlightsMap, ProcessingStatus, StudyDocument};

#[derive(Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Find document by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<StudyDocument>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, file_name, content_type, ocr_text, highlights,
                   processing_status, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch document by ID")?;

        row.map(StudyDocument::try_from).transpose()
    }

    /// Insert or fully replace a document
    pub async fn upsert(&self, document: &StudyDocument) -> Result<()> {
        let highlights = serde_json::to_value(&document.highlights)?;

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, file_name, content_type, ocr_text, highlights,
                 processing_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                file_name = EXCLUDED.file_name,
                content_type = EXCLUDED.content_type,
                ocr_text = EXCLUDED.ocr_text,
                highlights = EXCLUDED.highlights,
                processing_status = EXCLUDED.processing_status,
                updated_at = EXCLUDED.updated_at
            "#
        )
        .bind(document.id)
        .bind(&document.file_name)
        .bind(&document.content_type)
        .bind(&document.ocr_text)
        .bind(&highlights)
        .bind(document.processing_status.as_str())
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert document")?;

        Ok(())
    }

    /// Replace the OCR blob wholesale. Returns false when no row matched.
    pub async fn update_ocr_text(&self, id: Uuid, ocr_text: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET
                ocr_text = $2,
                processing_status = $3,
                updated_at = $4
            WHERE id = $1
            "#
        )
        .bind(id)
        .bind(ocr_text)
        .bind(ProcessingStatus::Processed.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to update OCR text")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn update_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> Result<bool> {
        let highlights = serde_json::to_value(highlights)?;

        let result = sqlx::query(
            "UPDATE documents SET highlights = $2, updated_at = $3 WHERE id = $1"
        )
        .bind(id)
        .bind(&highlights)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to update highlights")?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the highlights of one page in place, leaving the other pages
    /// of the stored map untouched. An empty sanitized list removes the page.
    /// Returns the full map after the update, or `None` when no row matched.
    pub async fn merge_page_highlights(
        &self,
        id: Uuid,
        page: u32,
        phrases: Vec<HighlightPhrase>,
    ) -> Result<Option<HighlightsMap>> {
        let phrases = serde_json::to_value(HighlightPhrase::sanitize(phrases))?;

        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            UPDATE documents SET
                highlights = CASE
                    WHEN jsonb_array_length($3::jsonb) = 0 THEN highlights - $2::text
                    ELSE jsonb_set(highlights, ARRAY[$2::text], $3::jsonb)
                END,
                updated_at = $4
            WHERE id = $1
            RETURNING highlights
            "#
        )
        .bind(id)
        .bind(page.to_string())
        .bind(&phrases)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to merge page highlights")?;

        row.map(|(highlights,)| decode_highlights(highlights)).transpose()
    }

    /// Delete document
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    file_name: String,
    content_type: String,
    ocr_text: String,
    highlights: serde_json::Value,
    processing_status: String,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

fn decode_highlights(value: serde_json::Value) -> Result<HighlightsMap> {
    serde_json::from_value(value).context("Stored highlights are not a valid page map")
}

impl TryFrom<DocumentRow> for StudyDocument {
    type Error = anyhow::Error;

    fn try_from(row: DocumentRow) -> Result<Self> {
        let highlights = decode_highlights(row.highlights)
            .with_context(|| format!("Failed to decode document {}", row.id))?;

        Ok(Self {
            id: row.id,
            file_name: row.file_name,
            content_type: row.content_type,
            ocr_text: row.ocr_text,
            highlights,
            processing_status: ProcessingStatus::parse(&row.processing_status)
                .unwrap_or(ProcessingStatus::Uploaded),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use studylens_models::HighlightCategory;

    fn row(highlights: serde_json::Value) -> DocumentRow {
        let now = Utc::now();
        DocumentRow {
            id: Uuid::new_v4(),
            file_name: "biology.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            ocr_text: "===== Page 1 =====\ncells\n".to_string(),
            highlights,
            processing_status: "processed".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_with_page_map_converts() {
        let document = StudyDocument::try_from(row(json!({
            "2": [{"text": "osmosis", "type": "main"}]
        })))
        .unwrap();

        assert_eq!(
            document.highlights.get(2),
            &[HighlightPhrase::new("osmosis", HighlightCategory::Main)]
        );
        assert_eq!(document.processing_status, ProcessingStatus::Processed);
    }

    #[test]
    fn test_malformed_highlights_are_an_error() {
        for highlights in [json!("oops"), json!({"two": []}), json!([1, 2])] {
            let error = StudyDocument::try_from(row(highlights)).unwrap_err();
            assert!(format!("{:#}", error).contains("not a valid page map"));
        }
    }
}
