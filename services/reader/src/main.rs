//! StudyLens Reader Service
//!
//! Uploads study material, turns it into page-marked OCR text, serves pages
//! with category highlights applied and answers questions about them.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use studylens_database::build_document_store;
use studylens_utils::{init_logging, AppConfig};

mod api_error;
mod metrics;
mod routes;
mod service;
mod vlm_client;

use metrics::ReaderMetrics;
use routes::AppState;
use service::ReaderService;
use vlm_client::VlmClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        AppConfig::default()
    });

    // Initialize logging
    init_logging(&config.logging)?;
    info!("Starting StudyLens Reader");

    if config.ai.api_key.is_empty() {
        tracing::warn!("No AI API key configured, OCR and highlight requests will fail");
    }

    let store = build_document_store(&config.database).await?;
    info!("Document store ready ({})", store.backend());

    let metrics = Arc::new(ReaderMetrics::new(&config.monitoring.prometheus_namespace)?);
    let vlm = Arc::new(VlmClient::new(&config.ai, &config.reader.page_label)?);
    let service = ReaderService::new(
        store,
        vlm.clone(),
        vlm,
        config.reader.clone(),
        metrics.clone(),
    )?;

    let app = routes::create_app(
        AppState {
            service: Arc::new(service),
            metrics,
        },
        &config,
    );

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("Reader listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
