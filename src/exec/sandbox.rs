//! Child-process execution sandbox.
//!
//! Each call stages a scratch directory (dataset snapshot, instrumented
//! code, harness script), runs `python -u harness.py <dir>`, and harvests
//! results from a `result.json` the harness writes on every path. The
//! parent never hands its snapshot to the child, so a failed attempt
//! trivially leaves the caller's dataset byte-for-byte intact.
//!
//! Isolation is a process boundary plus the advisory deny-list in
//! [`super::harden`]; there is no namespace/seccomp/resource-limit layer
//! here. That is a known production gap, not a design choice to rely on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::ExecError;
use crate::sanitize;

use super::{
    harden, preamble, CodeTask, DatasetRef, ExecutionOutcome, Executor, PlotArtifact, PlotFormat,
};

/// Fixed driver script run by the interpreter. Binds `df` (when a dataset
/// is staged), `output_dir`, `aux_paths`, and an empty `artifact_manifest`,
/// executes the instrumented user code under the `<analysis>` filename
/// with stdout redirected into a buffer, and reports through
/// `result.json` whether it succeeded or raised.
const HARNESS: &str = r#"import io
import json
import os
import sys
import traceback
from contextlib import redirect_stdout

work = sys.argv[1]
with open(os.path.join(work, "user_code.py")) as fh:
    source = fh.read()

ns = {"__name__": "__main__"}
input_csv = os.path.join(work, "input.csv")
if os.path.exists(input_csv):
    import pandas as pd
    ns["df"] = pd.read_csv(input_csv)
ns["output_dir"] = os.environ.get("TABEXEC_OUTPUT_DIR", work)
ns["artifact_manifest"] = []
aux = os.environ.get("TABEXEC_AUX_PATHS", "")
ns["aux_paths"] = [p for p in aux.split("\n") if p]

result = {"ok": True, "stdout": "", "error_type": None, "error_message": None,
          "traceback": None, "plots": [], "manifest": []}
buf = io.StringIO()
try:
    compiled = compile(source, "<analysis>", "exec")
    with redirect_stdout(buf):
        exec(compiled, ns)
except BaseException as exc:
    result["ok"] = False
    result["error_type"] = type(exc).__name__
    result["error_message"] = str(exc)
    result["traceback"] = traceback.format_exc()
    if "matplotlib" in sys.modules:
        import matplotlib.pyplot as plt
        plt.close("all")
else:
    plots_dir = os.environ.get("TABEXEC_PLOTS_DIR", work)
    if "matplotlib" in sys.modules:
        import matplotlib.pyplot as plt
        for num in plt.get_fignums():
            path = os.path.join(plots_dir, "figure_%d.png" % num)
            plt.figure(num).savefig(path)
            result["plots"].append(path)
        plt.close("all")
    result["manifest"] = [p for p in ns.get("artifact_manifest", [])
                          if isinstance(p, str) and os.path.exists(p)]
    df = ns.get("df")
    if df is not None and "pandas" in sys.modules:
        import pandas as pd
        if isinstance(df, pd.DataFrame):
            df.to_csv(os.path.join(work, "output.csv"), index=False)

result["stdout"] = buf.getvalue()
with open(os.path.join(work, "result.json"), "w") as fh:
    json.dump(result, fh)
"#;

#[derive(Debug, Deserialize)]
struct HarnessResult {
    ok: bool,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
    #[serde(default)]
    plots: Vec<String>,
    #[serde(default)]
    manifest: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Sandbox {
    python_bin: String,
}

impl Sandbox {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".into()))
    }
}

#[async_trait]
impl Executor for Sandbox {
    async fn execute(&self, task: &CodeTask) -> Result<ExecutionOutcome, ExecError> {
        let snapshot = match &task.dataset_ref {
            DatasetRef::Inline(ds) => Some(ds.clone()),
            DatasetRef::None => None,
            DatasetRef::Remote(id) => {
                return Err(ExecError::Config(format!(
                    "dataset '{id}' is a remote reference; the local sandbox cannot resolve it"
                )))
            }
        };

        // Scratch dir is dropped on every exit path below.
        let scratch = tempfile::tempdir()?;
        let work = scratch.path();

        if let Some(ds) = &snapshot {
            std::fs::write(work.join("input.csv"), ds.as_bytes())?;
        }

        let neutralized = harden::neutralize(&task.source_code);
        for (line, token) in neutralized.blocked.iter().copied() {
            warn!(line, token, "neutralized deny-listed construct");
        }
        let preamble_lines = if task.capture_artifacts {
            preamble::line_count()
        } else {
            0
        };
        let instrumented = if task.capture_artifacts {
            format!("{}{}", preamble::PREAMBLE, neutralized.code)
        } else {
            neutralized.code
        };
        std::fs::write(work.join("user_code.py"), instrumented)?;
        std::fs::write(work.join("harness.py"), HARNESS)?;

        let plots_dir = task
            .plots_dir
            .clone()
            .unwrap_or_else(|| work.join("plots"));
        std::fs::create_dir_all(&plots_dir)?;
        let output_dir = task
            .output_dir
            .clone()
            .unwrap_or_else(|| work.join("outputs"));
        std::fs::create_dir_all(&output_dir)?;
        let aux_joined = task
            .auxiliary_paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");

        let output = Command::new(&self.python_bin)
            .arg("-u")
            .arg(work.join("harness.py"))
            .arg(work)
            .env("TABEXEC_PLOTS_DIR", &plots_dir)
            .env("TABEXEC_PLOT_FORMAT", task.plot_format.as_str())
            .env("TABEXEC_OUTPUT_DIR", &output_dir)
            .env("TABEXEC_AUX_PATHS", aux_joined)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                ExecError::Infrastructure(format!(
                    "failed to start interpreter '{}': {e}",
                    self.python_bin
                ))
            })?;

        let result_path = work.join("result.json");
        if !result_path.exists() {
            // The harness itself died before reporting; not attributable
            // to the submitted code.
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::Infrastructure(format!(
                "interpreter exited ({}) without a result: {}",
                output.status,
                tail(&stderr, 400)
            )));
        }
        let result: HarnessResult = serde_json::from_str(&std::fs::read_to_string(&result_path)?)
            .map_err(|e| ExecError::Infrastructure(format!("malformed harness result: {e}")))?;

        if !result.ok {
            let error_type = result.error_type.as_deref().unwrap_or("RuntimeError");
            let error_message = result.error_message.as_deref().unwrap_or_default();
            let diagnostic = sanitize::sanitize(
                error_type,
                error_message,
                result.traceback.as_deref().unwrap_or_default(),
                &task.source_code,
                preamble_lines,
            );
            debug!(error_type, fault_line = ?diagnostic.fault_line, "execution raised");
            return Ok(ExecutionOutcome::runtime_error(result.stdout, diagnostic));
        }

        let mut plot_artifacts = Vec::new();
        for path in &result.plots {
            match std::fs::read(path) {
                Ok(payload) => plot_artifacts.push(PlotArtifact {
                    format: PlotFormat::Png,
                    payload,
                    sequence_index: plot_artifacts.len(),
                }),
                Err(e) => warn!(path = %path, error = %e, "raster plot listed but unreadable"),
            }
        }
        // Interactive charts come only from the manifest the run appended
        // to, never from diffing the plots directory.
        for path in &result.manifest {
            match std::fs::read(path) {
                Ok(payload) => plot_artifacts.push(PlotArtifact {
                    format: task.plot_format,
                    payload,
                    sequence_index: plot_artifacts.len(),
                }),
                Err(e) => warn!(path = %path, error = %e, "manifest artifact unreadable"),
            }
        }

        let generated_dataset_paths = if task.output_dir.is_some() {
            harvest_output_dir(&output_dir)?
        } else {
            Vec::new()
        };

        let output_csv = work.join("output.csv");
        let resulting_dataset = if output_csv.exists() {
            Some(Dataset::from_csv_bytes(std::fs::read(&output_csv)?))
        } else {
            snapshot
        };

        let mut outcome = ExecutionOutcome::success(result.stdout, resulting_dataset);
        outcome.plot_artifacts = plot_artifacts;
        outcome.generated_dataset_paths = generated_dataset_paths;
        Ok(outcome)
    }
}

/// List files the code left under the output directory; remove the
/// directory entirely when it ended up containing nothing.
fn harvest_output_dir(dir: &Path) -> Result<Vec<PathBuf>, ExecError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    if paths.is_empty() {
        let _ = std::fs::remove_dir(dir);
    }
    Ok(paths)
}

fn tail(text: &str, max: usize) -> &str {
    let len = text.len();
    if len <= max {
        return text.trim_end();
    }
    let mut start = len - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim_end()
}
