//! HTTP client for the remote executor service.
//!
//! Exposes the same [`Executor`] contract as the local sandbox over a
//! single request/response exchange. Transport-level failures (refused
//! connection, timeout, non-2xx without a structured body) surface as
//! [`ExecError::Infrastructure`], a different animal from an in-band
//! runtime error, because the fault is not attributable to the code.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::dataset::ColumnInfo;
use crate::error::ExecError;
use crate::exec::{CodeTask, DatasetRef, ExecutionOutcome, Executor};

pub mod wire;

use wire::{ColumnsResponse, ErrorBody, ExecuteRequest, PreviewResponse, SampleResponse, UploadResponse};

#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ExecError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExecError::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, ExecError> {
        let base_url = cfg
            .get("EXEC_BASE_URL")
            .ok_or_else(|| ExecError::Config("EXEC_BASE_URL is not set".into()))?;
        let timeout = cfg.get_usize("REQUEST_TIMEOUT").unwrap_or(60) as u64;
        Self::new(base_url, timeout)
    }

    pub async fn upload_dataset(&self, id: &str, bytes: Vec<u8>) -> Result<UploadResponse, ExecError> {
        let url = format!("{}/datasets/{id}", self.base_url);
        let resp = self
            .http
            .post(url)
            .body(bytes)
            .send()
            .await
            .map_err(transport)?;
        read_json(resp).await
    }

    pub async fn row_sample(&self, id: &str, rows: usize) -> Result<SampleResponse, ExecError> {
        let url = format!("{}/datasets/{id}/sample?rows={rows}", self.base_url);
        let resp = self.http.get(url).send().await.map_err(transport)?;
        read_json(resp).await
    }

    pub async fn columns(&self, id: &str) -> Result<Vec<ColumnInfo>, ExecError> {
        let url = format!("{}/datasets/{id}/columns", self.base_url);
        let resp = self.http.get(url).send().await.map_err(transport)?;
        let body: ColumnsResponse = read_json(resp).await?;
        Ok(body.columns)
    }

    pub async fn preview(&self, id: &str, rows: usize) -> Result<String, ExecError> {
        let url = format!("{}/datasets/{id}/preview?rows={rows}", self.base_url);
        let resp = self.http.get(url).send().await.map_err(transport)?;
        let body: PreviewResponse = read_json(resp).await?;
        Ok(body.preview)
    }
}

#[async_trait]
impl Executor for RemoteClient {
    async fn execute(&self, task: &CodeTask) -> Result<ExecutionOutcome, ExecError> {
        let dataset_id = match &task.dataset_ref {
            DatasetRef::Remote(id) => Some(id.clone()),
            DatasetRef::None => None,
            DatasetRef::Inline(_) => {
                return Err(ExecError::Config(
                    "inline dataset cannot travel with a remote execution; upload it first".into(),
                ))
            }
        };
        let request = ExecuteRequest {
            code: task.source_code.clone(),
            dataset_id,
            capture_artifacts: task.capture_artifacts,
            plots_dir: task
                .plots_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            plot_format: task.plot_format,
            output_dir: task
                .output_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        };
        let url = format!("{}/execute", self.base_url);
        let resp = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        let body: wire::ExecuteResponse = read_json(resp).await?;
        wire::decode_outcome(body)
    }
}

fn transport(e: reqwest::Error) -> ExecError {
    ExecError::Infrastructure(e.to_string())
}

/// Decode a 2xx body, or map a structured error body back onto the
/// taxonomy; anything else is a transport-level failure.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ExecError> {
    let status = resp.status();
    if status.is_success() {
        return resp.json::<T>().await.map_err(transport);
    }
    let text = resp.text().await.unwrap_or_default();
    if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
        return Err(match (status, body.kind.as_str()) {
            (StatusCode::NOT_FOUND, _) | (_, "not_found") => ExecError::NotFound(body.error),
            (_, "config") => ExecError::Config(body.error),
            _ => ExecError::Infrastructure(body.error),
        });
    }
    Err(ExecError::Infrastructure(format!("{status}: {text}")))
}
