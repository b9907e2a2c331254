use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

use milky_rag::{
    FileStoreAdmin, GenerationService, IndexingService, PipelineError, QueryPipeline,
    UploadInput, UploadRecord,
};

pub type Admin = FileStoreAdmin<Arc<dyn IndexingService>>;
pub type Query = QueryPipeline<Arc<dyn GenerationService>>;

pub struct AppState {
    admin: Admin,
    query: Query,
}

impl AppState {
    pub fn new(admin: Admin, query: Query) -> Self {
        Self { admin, query }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/admin", get(serve_admin))
        .route("/healthz", get(healthz))
        .route("/api/admin/files", get(list_files))
        .route("/api/admin/files/:id", delete(delete_file))
        .route("/api/admin/upload", post(upload_file))
        .route("/api/ask", post(ask))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn serve_index() -> Html<&'static str> {
    Html(include_str!("../../../ui/index.html"))
}

async fn serve_admin() -> Html<&'static str> {
    Html(include_str!("../../../ui/admin.html"))
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
struct FileList {
    files: Vec<UploadRecord>,
}

async fn list_files(State(state): State<Arc<AppState>>) -> Json<FileList> {
    Json(FileList {
        files: state.admin.list_files(),
    })
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, AppError> {
    let form = read_upload_form(&mut multipart).await?;
    let file = form
        .file
        .ok_or_else(|| AppError::bad_request("missing file"))?;
    let record = state
        .admin
        .upload_file_and_index(UploadInput {
            reader: Cursor::new(file.data),
            filename: file.filename,
            display_name: form.display_name,
        })
        .await?;
    Ok(Json(json!({ "ok": true, "file": record })))
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.admin.delete_file(&id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct AskRequest {
    #[serde(default)]
    question: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    answer: String,
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AskRequest>,
) -> Result<Json<AskResponse>, AskError> {
    let question = body.question.unwrap_or_default();
    let answer = state.query.ask(&question).await.map_err(AskError)?;
    Ok(Json(AskResponse { answer }))
}

struct UploadedFile {
    data: Vec<u8>,
    filename: Option<String>,
}

#[derive(Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    display_name: Option<String>,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(AppError::bad_request)?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(|s| s.to_string());
                let data = field.bytes().await.map_err(AppError::bad_request)?;
                form.file = Some(UploadedFile {
                    data: data.to_vec(),
                    filename,
                });
            }
            Some("display_name") => {
                form.display_name = Some(field.text().await.map_err(AppError::bad_request)?);
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Admin endpoint failures, rendered as `{"ok": false, "error": ...}`.
#[derive(Debug, Error)]
enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    fn bad_request<E: ToString>(msg: E) -> Self {
        Self::BadRequest(msg.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Pipeline(PipelineError::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Pipeline(PipelineError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("internal_error" = %self);
        }
        let body = json!({ "ok": false, "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Question endpoint failures, rendered as `{"error": ...}`.
struct AskError(PipelineError);

impl IntoResponse for AskError {
    fn into_response(self) -> Response {
        match self.0 {
            PipelineError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            err => {
                error!("internal_error" = %err);
                let body = json!({ "error": format!("server error: {err}") });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
