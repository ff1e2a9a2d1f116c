//! Execution engine: task/outcome types and the executor seam.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::ExecError;
use crate::sanitize::SanitizedError;

pub mod harden;
pub mod preamble;
pub mod sandbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotFormat {
    Png,
    Json,
    Html,
}

impl PlotFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlotFormat::Png => "png",
            PlotFormat::Json => "json",
            PlotFormat::Html => "html",
        }
    }
}

impl std::str::FromStr for PlotFormat {
    type Err = ExecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(PlotFormat::Png),
            "json" => Ok(PlotFormat::Json),
            "html" => Ok(PlotFormat::Html),
            other => Err(ExecError::Config(format!("unknown plot format: {other}"))),
        }
    }
}

/// Where the dataset for a task lives.
#[derive(Debug, Clone, Default)]
pub enum DatasetRef {
    /// No dataset bound; the code runs without a `df` binding.
    #[default]
    None,
    /// In-process value, owned by the task.
    Inline(Dataset),
    /// Opaque identifier resolved by the remote backend's cache.
    Remote(String),
}

/// One code-generation turn's worth of work. Fields are public; callers
/// configure capture and directory options directly after `new`.
#[derive(Debug, Clone)]
pub struct CodeTask {
    pub source_code: String,
    pub dataset_ref: DatasetRef,
    /// Read-only input files exposed to the code as `aux_paths`.
    pub auxiliary_paths: Vec<PathBuf>,
    /// Where the code may write new dataset files. `None` confines writes
    /// to the sandbox scratch directory.
    pub output_dir: Option<PathBuf>,
    pub capture_artifacts: bool,
    /// Directory where captured plot files land. `None` keeps them inside
    /// the scratch directory (payloads are harvested either way).
    pub plots_dir: Option<PathBuf>,
    pub plot_format: PlotFormat,
}

impl CodeTask {
    pub fn new(source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            dataset_ref: DatasetRef::None,
            auxiliary_paths: Vec::new(),
            output_dir: None,
            capture_artifacts: true,
            plots_dir: None,
            plot_format: PlotFormat::Png,
        }
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.dataset_ref = DatasetRef::Inline(dataset);
        self
    }

    pub fn with_remote_dataset(mut self, id: impl Into<String>) -> Self {
        self.dataset_ref = DatasetRef::Remote(id.into());
        self
    }

    /// Same task with a replacement code candidate (correction rounds).
    pub fn with_source(&self, source_code: String) -> Self {
        Self {
            source_code,
            ..self.clone()
        }
    }

    pub fn inline_dataset(&self) -> Option<&Dataset> {
        match &self.dataset_ref {
            DatasetRef::Inline(ds) => Some(ds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    RuntimeError,
    InfrastructureError,
}

/// A captured chart. `payload` is PNG bytes for raster charts and verbatim
/// file text for interactive ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotArtifact {
    pub format: PlotFormat,
    pub payload: Vec<u8>,
    pub sequence_index: usize,
}

/// Everything observable from one execution attempt. Consumed immediately
/// by the correction loop or the output envelope, never persisted.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub stdout_text: String,
    /// Present only on success.
    pub resulting_dataset: Option<Dataset>,
    pub plot_artifacts: Vec<PlotArtifact>,
    pub generated_dataset_paths: Vec<PathBuf>,
    pub diagnostic: Option<SanitizedError>,
}

impl ExecutionOutcome {
    pub fn success(stdout_text: String, resulting_dataset: Option<Dataset>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            stdout_text,
            resulting_dataset,
            plot_artifacts: Vec::new(),
            generated_dataset_paths: Vec::new(),
            diagnostic: None,
        }
    }

    pub fn runtime_error(stdout_text: String, diagnostic: SanitizedError) -> Self {
        Self {
            status: OutcomeStatus::RuntimeError,
            stdout_text,
            resulting_dataset: None,
            plot_artifacts: Vec::new(),
            generated_dataset_paths: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }

    /// The generator declined to produce code; treated as a conversational
    /// answer with nothing to execute.
    pub fn empty_answer() -> Self {
        Self::success(String::new(), None)
    }

    /// Terminal outcome for a failure in the execution machinery itself,
    /// for callers that present rather than propagate it.
    pub fn infrastructure_error(message: String) -> Self {
        Self {
            status: OutcomeStatus::InfrastructureError,
            stdout_text: String::new(),
            resulting_dataset: None,
            plot_artifacts: Vec::new(),
            generated_dataset_paths: Vec::new(),
            diagnostic: Some(SanitizedError::from_rendered(&message)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Execution contract shared by the local sandbox and the remote client.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &CodeTask) -> Result<ExecutionOutcome, ExecError>;
}
