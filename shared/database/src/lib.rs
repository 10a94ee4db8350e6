pub mod postgres;
pub mod migrations;
pub mod repositories;
pub mod store;

pub use postgres::{PostgresPool, create_postgres_pool, health_check as postgres_health_check};
pub use repositories::*;
pub use store::{CachedStore, DocumentStore, MemoryStore, PostgresStore};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use studylens_utils::DatabaseConfig;

pub async fn initialize_postgres(database_url: &str, config: &DatabaseConfig) -> Result<PostgresPool> {
    let postgres_pool = create_postgres_pool(
        database_url,
        config.max_connections,
        Duration::from_secs(config.connection_timeout_seconds),
    )
    .await?;

    // Run migrations
    migrations::run_postgres_migrations(&postgres_pool).await?;

    Ok(postgres_pool)
}

/// Picks the document store for the configured backend. Without a Postgres
/// URL documents live in memory for the lifetime of the process.
pub async fn build_document_store(config: &DatabaseConfig) -> Result<Arc<dyn DocumentStore>> {
    match &config.postgres_url {
        Some(url) => {
            let pool = initialize_postgres(url, config).await?;
            let primary = Arc::new(PostgresStore::new(DocumentRepository::new(pool)));
            Ok(Arc::new(CachedStore::new(primary)))
        }
        None => {
            tracing::warn!("No postgres_url configured, documents are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
