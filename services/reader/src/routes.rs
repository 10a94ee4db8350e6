use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;
use validator::Validate;

use studylens_models::{ChatMessage, HighlightPhrase, HighlightsMap, StudyDocument};
use studylens_utils::{validate_model, AppConfig, StudyError};

use crate::api_error::ApiResult;
use crate::metrics::ReaderMetrics;
use crate::service::{ChatReply, HighlightOutcome, IngestOutcome, PageView, ReaderService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReaderService>,
    pub metrics: Arc<ReaderMetrics>,
}

pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_api_routes());

    if config.monitoring.metrics_enabled {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
            )
            .layer(DefaultBodyLimit::max(config.server.max_request_size)),
    )
    .with_state(state)
}

fn create_api_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(upload_document))
        .route("/documents/:id", get(get_document).delete(delete_document))
        .route("/documents/:id/ocr", post(rerun_ocr))
        .route("/documents/:id/text", put(replace_text))
        .route("/documents/:id/pages", get(list_pages))
        .route("/documents/:id/pages/:page", get(get_page).put(edit_page))
        .route(
            "/documents/:id/highlights",
            get(get_highlights).post(generate_highlights),
        )
        .route("/documents/:id/highlights/:page", axum::routing::delete(clear_highlights))
        .route("/documents/:id/chat", post(chat))
}

async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let store = state.service.store();
    let store_status = match store.health_check().await {
        Ok(()) => json!({"status": "healthy", "backend": store.backend()}),
        Err(e) => json!({"status": "unhealthy", "backend": store.backend(), "message": e.to_string()}),
    };
    let status = if store_status["status"] == "healthy" { "healthy" } else { "degraded" };

    Json(json!({
        "status": status,
        "service": "studylens-reader",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": { "store": store_status }
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// Reads the first multipart field that carries a file name.
async fn read_upload(mut multipart: Multipart) -> Result<UploadedFile, StudyError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| StudyError::validation("file", format!("Failed to read upload: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| StudyError::validation("file", format!("Failed to read file data: {}", e)))?;

        return Ok(UploadedFile {
            file_name,
            content_type,
            data: data.to_vec(),
        });
    }
    Err(StudyError::validation("file", "No file provided"))
}

/// Upload a document and run OCR on it
///
/// POST /api/v1/documents
async fn upload_document(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let upload = read_upload(multipart).await?;
    let outcome = state
        .service
        .ingest(&upload.file_name, upload.content_type.as_deref(), &upload.data)
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn get_document(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<StudyDocument>> {
    Ok(Json(state.service.document(id).await?))
}

async fn delete_document(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Re-run OCR with a new copy of the file, replacing the whole text
///
/// POST /api/v1/documents/:id/ocr
async fn rerun_ocr(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<IngestOutcome>> {
    let upload = read_upload(multipart).await?;
    let outcome = state
        .service
        .rerun_ocr(id, &upload.file_name, upload.content_type.as_deref(), &upload.data)
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TextRequest {
    #[validate(length(min = 1, message = "Text must not be empty"))]
    pub text: String,
}

async fn replace_text(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<IngestOutcome>> {
    validate_model(&request)?;
    Ok(Json(state.service.replace_text(id, &request.text).await?))
}

#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pub page_count: usize,
    pub pages: Vec<String>,
}

async fn list_pages(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<PagesResponse>> {
    let pages = state.service.pages(id).await?;
    Ok(Json(PagesResponse {
        page_count: pages.len(),
        pages,
    }))
}

async fn get_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(Uuid, i64)>,
) -> ApiResult<Json<PageView>> {
    Ok(Json(state.service.page_view(id, page).await?))
}

async fn edit_page(
    State(state): State<AppState>,
    Path((id, page)): Path<(Uuid, i64)>,
    Json(request): Json<TextRequest>,
) -> ApiResult<Json<PageView>> {
    validate_model(&request)?;
    Ok(Json(state.service.edit_page(id, page, &request.text).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct HighlightRequest {
    #[validate(length(min = 1, max = 4000, message = "Instruction must be between 1 and 4000 characters"))]
    pub instruction: String,
    /// Falls back to a page named in the instruction.
    pub page: Option<i64>,
}

/// Generate highlights for one page
///
/// POST /api/v1/documents/:id/highlights
async fn generate_highlights(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<HighlightRequest>,
) -> ApiResult<Json<HighlightOutcome>> {
    validate_model(&request)?;
    let outcome = state
        .service
        .generate_highlights(id, &request.instruction, request.page)
        .await?;
    Ok(Json(outcome))
}

async fn get_highlights(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<HighlightsMap>> {
    Ok(Json(state.service.highlights(id).await?))
}

async fn clear_highlights(
    State(state): State<AppState>,
    Path((id, page)): Path<(Uuid, i64)>,
) -> ApiResult<Json<Vec<HighlightPhrase>>> {
    Ok(Json(state.service.clear_highlights(id, page).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 8000, message = "Question must be between 1 and 8000 characters"))]
    pub question: String,
    #[serde(default)]
    #[validate]
    pub history: Vec<ChatMessage>,
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    validate_model(&request)?;
    let reply = state
        .service
        .chat(id, &request.question, &request.history)
        .await?;
    Ok(Json(reply))
}
