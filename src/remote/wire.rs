//! JSON wire contract shared by the HTTP service and its client.
//!
//! Binary plot payloads cross as base64; interactive (json/html) payloads
//! cross as inline text.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::dataset::ColumnInfo;
use crate::error::ExecError;
use crate::exec::{ExecutionOutcome, PlotArtifact, PlotFormat};
use crate::sanitize::SanitizedError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub dataset_id: Option<String>,
    #[serde(default)]
    pub capture_artifacts: bool,
    #[serde(default)]
    pub plots_dir: String,
    pub plot_format: PlotFormat,
    #[serde(default)]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Captured stdout on success, `null` on error.
    pub results: Option<String>,
    /// Rendered diagnostic on runtime error, `null` on success.
    pub error: Option<String>,
    pub plot_images: Vec<PlotImage>,
    pub generated_datasets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotImage {
    pub data: String,
    pub format: PlotFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub rows: usize,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnsResponse {
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub error: String,
}

pub fn encode_outcome(outcome: &ExecutionOutcome) -> ExecuteResponse {
    let plot_images = outcome
        .plot_artifacts
        .iter()
        .map(|p| PlotImage {
            data: match p.format {
                PlotFormat::Png => BASE64.encode(&p.payload),
                PlotFormat::Json | PlotFormat::Html => {
                    String::from_utf8_lossy(&p.payload).into_owned()
                }
            },
            format: p.format,
        })
        .collect();
    ExecuteResponse {
        results: outcome.is_success().then(|| outcome.stdout_text.clone()),
        error: outcome.diagnostic.as_ref().map(|d| d.rendered.clone()),
        plot_images,
        generated_datasets: outcome
            .generated_dataset_paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect(),
    }
}

/// Rebuild an outcome on the client side. The resulting dataset stays
/// server-side (in the cache, under the request's id), so it is absent
/// here by design.
pub fn decode_outcome(resp: ExecuteResponse) -> Result<ExecutionOutcome, ExecError> {
    let mut plot_artifacts = Vec::with_capacity(resp.plot_images.len());
    for (sequence_index, img) in resp.plot_images.into_iter().enumerate() {
        let payload = match img.format {
            PlotFormat::Png => BASE64
                .decode(img.data.as_bytes())
                .map_err(|e| ExecError::Infrastructure(format!("undecodable plot payload: {e}")))?,
            PlotFormat::Json | PlotFormat::Html => img.data.into_bytes(),
        };
        plot_artifacts.push(PlotArtifact {
            format: img.format,
            payload,
            sequence_index,
        });
    }

    let mut outcome = match resp.error {
        Some(rendered) => {
            ExecutionOutcome::runtime_error(String::new(), SanitizedError::from_rendered(&rendered))
        }
        None => ExecutionOutcome::success(resp.results.unwrap_or_default(), None),
    };
    outcome.plot_artifacts = plot_artifacts;
    outcome.generated_dataset_paths = resp
        .generated_datasets
        .into_iter()
        .map(std::path::PathBuf::from)
        .collect();
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize;

    #[test]
    fn success_outcome_crosses_the_wire() {
        let mut outcome = ExecutionOutcome::success("hi\n".into(), None);
        outcome.plot_artifacts.push(PlotArtifact {
            format: PlotFormat::Png,
            payload: vec![1, 2, 3],
            sequence_index: 0,
        });
        let resp = encode_outcome(&outcome);
        assert_eq!(resp.results.as_deref(), Some("hi\n"));
        assert!(resp.error.is_none());
        let back = decode_outcome(resp).unwrap();
        assert!(back.is_success());
        assert_eq!(back.plot_artifacts[0].payload, vec![1, 2, 3]);
    }

    #[test]
    fn runtime_error_carries_the_rendered_diagnostic() {
        let diag = sanitize::sanitize("ValueError", "bad", "", "raise ValueError('bad')\n", 0);
        let outcome = ExecutionOutcome::runtime_error(String::new(), diag);
        let resp = encode_outcome(&outcome);
        assert!(resp.results.is_none());
        let back = decode_outcome(resp).unwrap();
        let d = back.diagnostic.expect("diagnostic survives");
        assert!(d.rendered.contains("ValueError: bad"));
    }

    #[test]
    fn interactive_payloads_are_inline_text() {
        let mut outcome = ExecutionOutcome::success(String::new(), None);
        outcome.plot_artifacts.push(PlotArtifact {
            format: PlotFormat::Json,
            payload: b"{\"data\":[]}".to_vec(),
            sequence_index: 0,
        });
        let resp = encode_outcome(&outcome);
        assert_eq!(resp.plot_images[0].data, "{\"data\":[]}");
    }

    #[test]
    fn request_uses_camel_case_keys() {
        let req = ExecuteRequest {
            code: "print(1)".into(),
            dataset_id: Some("sales".into()),
            capture_artifacts: true,
            plots_dir: String::new(),
            plot_format: PlotFormat::Png,
            output_dir: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"datasetId\""));
        assert!(json.contains("\"captureArtifacts\""));
        assert!(json.contains("\"plotFormat\":\"png\""));
    }
}
