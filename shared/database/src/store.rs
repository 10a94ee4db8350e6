//! Document persistence seam.
//!
//! The reader service only talks to [`DocumentStore`]. Postgres is the
//! durable backend, [`MemoryStore`] serves tests and database-less runs, and
//! [`CachedStore`] keeps the service usable while the primary is down.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use studylens_models::{HighlightPhrase, HighlightsMap, StudyDocument};
use studylens_utils::{StudyError, StudyResult};

use crate::repositories::DocumentRepository;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, id: Uuid) -> StudyResult<Option<StudyDocument>>;

    /// Inserts the document or replaces it wholesale.
    async fn save(&self, document: &StudyDocument) -> StudyResult<()>;

    /// Replaces the OCR blob and marks the document processed.
    async fn set_ocr_text(&self, id: Uuid, ocr_text: &str) -> StudyResult<()>;

    async fn set_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> StudyResult<()>;

    /// Replaces the highlights of one page as a single step against the
    /// stored map, so concurrent merges for other pages are never lost.
    /// Returns the map as stored afterwards.
    async fn merge_page_highlights(
        &self,
        id: Uuid,
        page: u32,
        phrases: Vec<HighlightPhrase>,
    ) -> StudyResult<HighlightsMap>;

    /// Returns whether a document was removed.
    async fn delete(&self, id: Uuid) -> StudyResult<bool>;

    async fn health_check(&self) -> StudyResult<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str;
}

fn document_not_found(id: Uuid) -> StudyError {
    StudyError::not_found(format!("document {}", id))
}

fn database_error(error: anyhow::Error) -> StudyError {
    StudyError::database(format!("{:#}", error))
}

pub struct PostgresStore {
    repository: DocumentRepository,
}

impl PostgresStore {
    pub fn new(repository: DocumentRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn load(&self, id: Uuid) -> StudyResult<Option<StudyDocument>> {
        self.repository.find_by_id(id).await.map_err(database_error)
    }

    async fn save(&self, document: &StudyDocument) -> StudyResult<()> {
        self.repository.upsert(document).await.map_err(database_error)
    }

    async fn set_ocr_text(&self, id: Uuid, ocr_text: &str) -> StudyResult<()> {
        match self.repository.update_ocr_text(id, ocr_text).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(document_not_found(id)),
            Err(e) => Err(database_error(e)),
        }
    }

    async fn set_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> StudyResult<()> {
        match self.repository.update_highlights(id, highlights).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(document_not_found(id)),
            Err(e) => Err(database_error(e)),
        }
    }

    async fn merge_page_highlights(
        &self,
        id: Uuid,
        page: u32,
        phrases: Vec<HighlightPhrase>,
    ) -> StudyResult<HighlightsMap> {
        self.repository
            .merge_page_highlights(id, page, phrases)
            .await
            .map_err(database_error)?
            .ok_or_else(|| document_not_found(id))
    }

    async fn delete(&self, id: Uuid) -> StudyResult<bool> {
        self.repository.delete(id).await.map_err(database_error)
    }

    async fn health_check(&self) -> StudyResult<()> {
        crate::postgres::health_check(self.repository.pool())
            .await
            .map_err(database_error)
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, StudyDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored document, oldest first.
    pub async fn list(&self) -> Vec<StudyDocument> {
        let mut documents: Vec<StudyDocument> =
            self.documents.read().await.values().cloned().collect();
        documents.sort_by_key(|document| document.created_at);
        documents
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, id: Uuid) -> StudyResult<Option<StudyDocument>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn save(&self, document: &StudyDocument) -> StudyResult<()> {
        self.documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(())
    }

    async fn set_ocr_text(&self, id: Uuid, ocr_text: &str) -> StudyResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(&id).ok_or_else(|| document_not_found(id))?;
        document.replace_ocr_text(ocr_text);
        Ok(())
    }

    async fn set_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> StudyResult<()> {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(&id).ok_or_else(|| document_not_found(id))?;
        document.highlights = highlights.clone();
        document.touch();
        Ok(())
    }

    async fn merge_page_highlights(
        &self,
        id: Uuid,
        page: u32,
        phrases: Vec<HighlightPhrase>,
    ) -> StudyResult<HighlightsMap> {
        let mut documents = self.documents.write().await;
        let document = documents.get_mut(&id).ok_or_else(|| document_not_found(id))?;
        document.highlights.merge_page(page, phrases);
        document.touch();
        Ok(document.highlights.clone())
    }

    async fn delete(&self, id: Uuid) -> StudyResult<bool> {
        Ok(self.documents.write().await.remove(&id).is_some())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

/// Primary store fronted by an in-memory copy. Writes go to both; when the
/// primary fails, reads are served from the cache and writes stay cached.
///
/// Documents written during an outage are tracked as pending. They are
/// served from the cache and written only there until the primary accepts
/// them again, which is retried before every operation.
pub struct CachedStore {
    primary: Arc<dyn DocumentStore>,
    cache: MemoryStore,
    pending: Mutex<HashSet<Uuid>>,
}

impl CachedStore {
    pub fn new(primary: Arc<dyn DocumentStore>) -> Self {
        Self {
            primary,
            cache: MemoryStore::new(),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &MemoryStore {
        &self.cache
    }

    /// Number of documents the primary has not caught up with yet.
    pub async fn pending_writes(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn is_pending(&self, id: Uuid) -> bool {
        self.pending.lock().await.contains(&id)
    }

    /// Pushes cached copies of pending documents to the primary. Stops at
    /// the first failure and leaves the rest pending.
    async fn flush_pending(&self) {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return;
        }

        let ids: Vec<Uuid> = pending.iter().copied().collect();
        for id in ids {
            let result = match self.cache.load(id).await {
                Ok(Some(document)) => self.primary.save(&document).await,
                Ok(None) => self.primary.delete(id).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    pending.remove(&id);
                }
                Err(e) => {
                    studylens_utils::log_debug!(
                        "Primary {} store still unavailable, {} documents pending: {}",
                        self.primary.backend(),
                        pending.len(),
                        e
                    );
                    return;
                }
            }
        }
        tracing::info!("Primary {} store caught up with cached writes", self.primary.backend());
    }

    /// Combines the outcome of a write against both stores. A change that
    /// only reached the cache marks the document pending.
    async fn settle(
        &self,
        id: Uuid,
        operation: &str,
        primary: StudyResult<()>,
        cached: StudyResult<()>,
    ) -> StudyResult<()> {
        match (primary, cached) {
            (Ok(()), _) => Ok(()),
            (Err(e), Ok(())) => {
                studylens_utils::log_warn!(
                    "Primary {} store failed during {}, kept change in memory: {}",
                    self.primary.backend(),
                    operation,
                    e
                );
                self.pending.lock().await.insert(id);
                Ok(())
            }
            (Err(e), Err(_)) => Err(e),
        }
    }
}

#[async_trait]
impl DocumentStore for CachedStore {
    async fn load(&self, id: Uuid) -> StudyResult<Option<StudyDocument>> {
        self.flush_pending().await;
        if self.is_pending(id).await {
            return self.cache.load(id).await;
        }

        match self.primary.load(id).await {
            Ok(Some(document)) => {
                self.cache.save(&document).await?;
                Ok(Some(document))
            }
            Ok(None) => self.cache.load(id).await,
            Err(e) => {
                studylens_utils::log_warn!(
                    "Primary {} store failed on load, serving from memory: {}",
                    self.primary.backend(),
                    e
                );
                self.cache.load(id).await
            }
        }
    }

    async fn save(&self, document: &StudyDocument) -> StudyResult<()> {
        self.flush_pending().await;
        let cached = self.cache.save(document).await;
        if self.is_pending(document.id).await {
            return cached;
        }
        let primary = self.primary.save(document).await;
        self.settle(document.id, "save", primary, cached).await
    }

    async fn set_ocr_text(&self, id: Uuid, ocr_text: &str) -> StudyResult<()> {
        self.flush_pending().await;
        let cached = self.cache.set_ocr_text(id, ocr_text).await;
        if self.is_pending(id).await {
            return cached;
        }
        let primary = self.primary.set_ocr_text(id, ocr_text).await;
        self.settle(id, "set_ocr_text", primary, cached).await
    }

    async fn set_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> StudyResult<()> {
        self.flush_pending().await;
        let cached = self.cache.set_highlights(id, highlights).await;
        if self.is_pending(id).await {
            return cached;
        }
        let primary = self.primary.set_highlights(id, highlights).await;
        self.settle(id, "set_highlights", primary, cached).await
    }

    async fn merge_page_highlights(
        &self,
        id: Uuid,
        page: u32,
        phrases: Vec<HighlightPhrase>,
    ) -> StudyResult<HighlightsMap> {
        self.flush_pending().await;
        let cached = self.cache.merge_page_highlights(id, page, phrases.clone()).await;
        if self.is_pending(id).await {
            return cached;
        }

        match self.primary.merge_page_highlights(id, page, phrases).await {
            Ok(merged) => {
                if cached.is_ok() {
                    self.cache.set_highlights(id, &merged).await?;
                }
                Ok(merged)
            }
            Err(e) => match cached {
                Ok(merged) => {
                    self.settle(id, "merge_page_highlights", Err(e), Ok(())).await?;
                    Ok(merged)
                }
                Err(_) => Err(e),
            },
        }
    }

    async fn delete(&self, id: Uuid) -> StudyResult<bool> {
        self.flush_pending().await;
        let cached = self.cache.delete(id).await?;
        if self.is_pending(id).await {
            return Ok(cached);
        }

        match self.primary.delete(id).await {
            Ok(removed) => Ok(removed || cached),
            Err(e) => {
                studylens_utils::log_warn!(
                    "Primary {} store failed on delete, retrying later: {}",
                    self.primary.backend(),
                    e
                );
                self.pending.lock().await.insert(id);
                Ok(cached)
            }
        }
    }

    async fn health_check(&self) -> StudyResult<()> {
        self.primary.health_check().await
    }

    fn backend(&self) -> &'static str {
        "cached"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use studylens_models::{HighlightCategory, ProcessingStatus};
    use tokio_test::{assert_err, assert_ok};

    struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn load(&self, _id: Uuid) -> StudyResult<Option<StudyDocument>> {
            Err(StudyError::database("connection refused"))
        }

        async fn save(&self, _document: &StudyDocument) -> StudyResult<()> {
            Err(StudyError::database("connection refused"))
        }

        async fn set_ocr_text(&self, _id: Uuid, _ocr_text: &str) -> StudyResult<()> {
            Err(StudyError::database("connection refused"))
        }

        async fn set_highlights(&self, _id: Uuid, _highlights: &HighlightsMap) -> StudyResult<()> {
            Err(StudyError::database("connection refused"))
        }

        async fn merge_page_highlights(
            &self,
            _id: Uuid,
            _page: u32,
            _phrases: Vec<HighlightPhrase>,
        ) -> StudyResult<HighlightsMap> {
            Err(StudyError::database("connection refused"))
        }

        async fn delete(&self, _id: Uuid) -> StudyResult<bool> {
            Err(StudyError::database("connection refused"))
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    /// Memory-backed primary that can be taken offline.
    #[derive(Default)]
    struct SwitchableStore {
        inner: MemoryStore,
        down: AtomicBool,
    }

    impl SwitchableStore {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> StudyResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(StudyError::database("connection refused"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DocumentStore for SwitchableStore {
        async fn load(&self, id: Uuid) -> StudyResult<Option<StudyDocument>> {
            self.check()?;
            self.inner.load(id).await
        }

        async fn save(&self, document: &StudyDocument) -> StudyResult<()> {
            self.check()?;
            self.inner.save(document).await
        }

        async fn set_ocr_text(&self, id: Uuid, ocr_text: &str) -> StudyResult<()> {
            self.check()?;
            self.inner.set_ocr_text(id, ocr_text).await
        }

        async fn set_highlights(&self, id: Uuid, highlights: &HighlightsMap) -> StudyResult<()> {
            self.check()?;
            self.inner.set_highlights(id, highlights).await
        }

        async fn merge_page_highlights(
            &self,
            id: Uuid,
            page: u32,
            phrases: Vec<HighlightPhrase>,
        ) -> StudyResult<HighlightsMap> {
            self.check()?;
            self.inner.merge_page_highlights(id, page, phrases).await
        }

        async fn delete(&self, id: Uuid) -> StudyResult<bool> {
            self.check()?;
            self.inner.delete(id).await
        }

        fn backend(&self) -> &'static str {
            "switchable"
        }
    }

    fn highlights() -> HighlightsMap {
        let mut map = HighlightsMap::new();
        map.merge_page(2, vec![HighlightPhrase::new("osmosis", HighlightCategory::Main)]);
        map
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let document = StudyDocument::new("biology.pdf", "application/pdf");
        store.save(&document).await.unwrap();

        store
            .set_ocr_text(document.id, "===== Page 1 =====\ncells\n")
            .await
            .unwrap();
        store.set_highlights(document.id, &highlights()).await.unwrap();

        let loaded = store.load(document.id).await.unwrap().unwrap();
        assert_eq!(loaded.ocr_text, "===== Page 1 =====\ncells\n");
        assert_eq!(loaded.processing_status, ProcessingStatus::Processed);
        assert_eq!(loaded.highlights, highlights());

        assert_eq!(store.list().await.len(), 1);
        assert!(store.delete(document.id).await.unwrap());
        assert!(!store.delete(document.id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_merge_keeps_other_pages() {
        let store = MemoryStore::new();
        let document = StudyDocument::new("biology.pdf", "application/pdf");
        store.save(&document).await.unwrap();
        store.set_highlights(document.id, &highlights()).await.unwrap();

        let merged = store
            .merge_page_highlights(
                document.id,
                1,
                vec![HighlightPhrase::new(" cells ", HighlightCategory::Key)],
            )
            .await
            .unwrap();
        assert_eq!(merged.pages().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(merged.get(1)[0].text, "cells");

        let merged = store.merge_page_highlights(document.id, 2, Vec::new()).await.unwrap();
        assert_eq!(merged.pages().collect::<Vec<_>>(), vec![1]);

        let error = store
            .merge_page_highlights(Uuid::new_v4(), 1, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(error.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_memory_store_missing_document() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(store.load(id).await.unwrap().is_none());

        let error = store.set_ocr_text(id, "text").await.unwrap_err();
        assert_eq!(error.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cached_store_falls_back_when_primary_fails() {
        let store = CachedStore::new(Arc::new(FailingStore));
        let document = StudyDocument::new("notes.png", "image/png");

        assert_ok!(store.save(&document).await);
        assert_ok!(store.set_highlights(document.id, &highlights()).await);

        let loaded = assert_ok!(store.load(document.id).await).unwrap();
        assert_eq!(loaded.id, document.id);
        assert_eq!(loaded.highlights, highlights());
        assert!(store.delete(document.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_cached_store_reports_failure_when_both_fail() {
        let store = CachedStore::new(Arc::new(FailingStore));
        let error = assert_err!(store.set_ocr_text(Uuid::new_v4(), "text").await);
        assert_eq!(error.error_code(), "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_cached_store_replays_writes_after_outage() {
        let primary = Arc::new(SwitchableStore::default());
        let store = CachedStore::new(primary.clone());
        let document = StudyDocument::new("biology.pdf", "application/pdf");
        assert_ok!(store.save(&document).await);

        primary.set_down(true);
        assert_ok!(store.set_highlights(document.id, &highlights()).await);
        assert_eq!(store.pending_writes().await, 1);

        primary.set_down(false);
        let loaded = assert_ok!(store.load(document.id).await).unwrap();
        assert_eq!(loaded.highlights, highlights());
        assert_eq!(store.pending_writes().await, 0);

        let stored = primary.inner.load(document.id).await.unwrap().unwrap();
        assert_eq!(stored.highlights, highlights());
    }

    #[tokio::test]
    async fn test_cached_store_serves_pending_documents_from_memory() {
        let primary = Arc::new(SwitchableStore::default());
        let store = CachedStore::new(primary.clone());
        let document = StudyDocument::new("biology.pdf", "application/pdf");
        assert_ok!(store.save(&document).await);

        primary.set_down(true);
        let merged = assert_ok!(
            store
                .merge_page_highlights(
                    document.id,
                    1,
                    vec![HighlightPhrase::new("cells", HighlightCategory::Key)],
                )
                .await
        );
        assert_eq!(merged.pages().collect::<Vec<_>>(), vec![1]);

        let loaded = assert_ok!(store.load(document.id).await).unwrap();
        assert_eq!(loaded.highlights.get(1).len(), 1);
        assert!(primary.inner.load(document.id).await.unwrap().unwrap().highlights.is_empty());
    }

    #[tokio::test]
    async fn test_cached_store_replays_delete_after_outage() {
        let primary = Arc::new(SwitchableStore::default());
        let store = CachedStore::new(primary.clone());
        let document = StudyDocument::new("biology.pdf", "application/pdf");
        assert_ok!(store.save(&document).await);

        primary.set_down(true);
        assert!(assert_ok!(store.delete(document.id).await));

        primary.set_down(false);
        assert!(assert_ok!(store.load(document.id).await).is_none());
        assert!(primary.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_cached_store_fills_cache_from_primary() {
        let primary = Arc::new(MemoryStore::new());
        let document = StudyDocument::new("history.pdf", "application/pdf");
        primary.save(&document).await.unwrap();

        let store = CachedStore::new(primary);
        assert!(store.cache().is_empty().await);
        store.load(document.id).await.unwrap();
        assert_eq!(store.cache().len().await, 1);
    }
}
