//! HTTP service exposing the sandbox over the wire contract.
//!
//! The dataset cache is constructed once at startup and injected through
//! shared state; handlers never touch global storage. `/execute` with an
//! unknown (or absent) dataset id runs with no dataset bound; only the
//! read-only utility endpoints reject unknown ids with 404.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::{debug, info};

use crate::cache::DatasetCache;
use crate::dataset::Dataset;
use crate::error::ExecError;
use crate::exec::sandbox::Sandbox;
use crate::exec::{CodeTask, DatasetRef, Executor};
use crate::remote::wire::{
    self, ColumnsResponse, ErrorBody, ExecuteRequest, ExecuteResponse, PreviewResponse,
    SampleResponse, UploadResponse,
};

const DEFAULT_SAMPLE_ROWS: usize = 5;
const DEFAULT_PREVIEW_ROWS: usize = 10;

#[derive(Debug)]
pub struct AppState {
    pub cache: DatasetCache,
    pub sandbox: Sandbox,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/datasets/{id}", post(upload))
        .route("/datasets/{id}/sample", get(sample))
        .route("/datasets/{id}/columns", get(columns))
        .route("/datasets/{id}/preview", get(preview))
        .with_state(state)
}

pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, capacity = state.cache.capacity(), "execution service listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

struct ApiError(ExecError);

impl From<ExecError> for ApiError {
    fn from(e: ExecError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ExecError::NotFound(_) => StatusCode::NOT_FOUND,
            ExecError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            kind: self.0.kind().to_string(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RowsQuery {
    rows: Option<usize>,
}

async fn execute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let dataset = match req.dataset_id.as_deref() {
        Some(id) => {
            let found = state.cache.get(id);
            if found.is_none() {
                // Not an error for /execute: the code simply runs with no
                // dataset bound.
                debug!(id, "dataset id not cached; executing unbound");
            }
            found
        }
        None => None,
    };

    let mut task = CodeTask::new(req.code);
    task.dataset_ref = dataset.map(DatasetRef::Inline).unwrap_or(DatasetRef::None);
    task.capture_artifacts = req.capture_artifacts;
    task.plot_format = req.plot_format;
    task.plots_dir = (!req.plots_dir.is_empty()).then(|| PathBuf::from(&req.plots_dir));
    task.output_dir = req.output_dir.as_deref().map(PathBuf::from);

    let outcome = state.sandbox.execute(&task).await?;

    // Later calls against the same id observe this run's mutation without
    // re-sending the dataset.
    if outcome.is_success() {
        if let (Some(id), Some(ds)) = (req.dataset_id.as_deref(), &outcome.resulting_dataset) {
            state.cache.put(id, ds.clone());
        }
    }

    Ok(Json(wire::encode_outcome(&outcome)))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let dataset = Dataset::from_csv_bytes(body.to_vec());
    let (rows, _) = dataset.shape();
    let columns = dataset.column_info();
    info!(id = %id, rows, columns = columns.len(), "dataset uploaded");
    state.cache.put(id, dataset);
    Ok(Json(UploadResponse { rows, columns }))
}

async fn sample(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<RowsQuery>,
) -> Result<Json<SampleResponse>, ApiError> {
    let dataset = lookup(&state, &id)?;
    Ok(Json(SampleResponse {
        columns: dataset.column_names(),
        rows: dataset.row_sample(q.rows.unwrap_or(DEFAULT_SAMPLE_ROWS)),
    }))
}

async fn columns(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ColumnsResponse>, ApiError> {
    let dataset = lookup(&state, &id)?;
    Ok(Json(ColumnsResponse {
        columns: dataset.column_info(),
    }))
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<RowsQuery>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let dataset = lookup(&state, &id)?;
    Ok(Json(PreviewResponse {
        preview: dataset.preview(q.rows.unwrap_or(DEFAULT_PREVIEW_ROWS)),
    }))
}

fn lookup(state: &AppState, id: &str) -> Result<Dataset, ApiError> {
    state
        .cache
        .get(id)
        .ok_or_else(|| ApiError(ExecError::NotFound(id.to_string())))
}
