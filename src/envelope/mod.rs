//! Output envelope: terminal outcomes normalized for presentation layers.
//!
//! The envelope renders whatever diagnostic is present verbatim and never
//! reinterprets a runtime error versus an exhausted budget: what to show
//! an end user is the presentation layer's call. Streaming consumers get
//! an ordered event sequence with an explicit end-of-stream marker.

use std::path::PathBuf;

use crate::correction::LoopOutcome;
use crate::exec::{ExecutionOutcome, OutcomeStatus, PlotArtifact};

#[derive(Debug, Clone)]
pub struct OutputEnvelope {
    /// Stdout on success; the rendered diagnostic otherwise, verbatim.
    pub text_result: String,
    /// Empty is a valid result, not an error.
    pub plot_artifacts: Vec<PlotArtifact>,
    /// Empty is a valid result, not an error.
    pub generated_dataset_paths: Vec<PathBuf>,
    /// Explicit "automatic correction budget exhausted" signal.
    pub exhausted: bool,
}

/// One unit of a streamed envelope. `Done` is emitted exactly once, after
/// every artifact for the turn has been flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeEvent {
    Text(String),
    Plot(PlotArtifact),
    DatasetPath(PathBuf),
    Done,
}

impl OutputEnvelope {
    pub fn from_outcome(outcome: &ExecutionOutcome) -> Self {
        let text_result = match outcome.status {
            OutcomeStatus::Success => outcome.stdout_text.clone(),
            OutcomeStatus::RuntimeError | OutcomeStatus::InfrastructureError => outcome
                .diagnostic
                .as_ref()
                .map(|d| d.rendered.clone())
                .unwrap_or_else(|| outcome.stdout_text.clone()),
        };
        Self {
            text_result,
            plot_artifacts: outcome.plot_artifacts.clone(),
            generated_dataset_paths: outcome.generated_dataset_paths.clone(),
            exhausted: false,
        }
    }

    pub fn from_loop_outcome(outcome: &LoopOutcome) -> Self {
        match outcome {
            LoopOutcome::Success(inner) => Self::from_outcome(inner),
            LoopOutcome::Exhausted { last_diagnostic } => Self {
                text_result: last_diagnostic.rendered.clone(),
                plot_artifacts: Vec::new(),
                generated_dataset_paths: Vec::new(),
                exhausted: true,
            },
        }
    }

    /// Ordered event stream: text, plots, dataset paths, then `Done`.
    pub fn into_events(self) -> impl Iterator<Item = EnvelopeEvent> {
        std::iter::once(EnvelopeEvent::Text(self.text_result))
            .chain(self.plot_artifacts.into_iter().map(EnvelopeEvent::Plot))
            .chain(
                self.generated_dataset_paths
                    .into_iter()
                    .map(EnvelopeEvent::DatasetPath),
            )
            .chain(std::iter::once(EnvelopeEvent::Done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::PlotFormat;
    use crate::sanitize;

    #[test]
    fn success_with_no_artifacts_is_valid() {
        let outcome = ExecutionOutcome::success("hi\n".into(), None);
        let env = OutputEnvelope::from_outcome(&outcome);
        assert_eq!(env.text_result, "hi\n");
        assert!(env.plot_artifacts.is_empty());
        assert!(env.generated_dataset_paths.is_empty());
        assert!(!env.exhausted);
    }

    #[test]
    fn stream_always_ends_with_exactly_one_done() {
        let mut outcome = ExecutionOutcome::success("text".into(), None);
        outcome.plot_artifacts.push(PlotArtifact {
            format: PlotFormat::Png,
            payload: vec![0],
            sequence_index: 0,
        });
        outcome.generated_dataset_paths.push(PathBuf::from("out.csv"));
        let events: Vec<_> = OutputEnvelope::from_outcome(&outcome).into_events().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&EnvelopeEvent::Done));
        assert_eq!(
            events.iter().filter(|e| **e == EnvelopeEvent::Done).count(),
            1
        );
        // Artifacts precede the marker.
        assert!(matches!(events[1], EnvelopeEvent::Plot(_)));
        assert!(matches!(events[2], EnvelopeEvent::DatasetPath(_)));
    }

    #[test]
    fn exhaustion_carries_the_last_diagnostic_verbatim() {
        let diag = sanitize::sanitize("ValueError", "bad", "", "raise\n", 0);
        let rendered = diag.rendered.clone();
        let env = OutputEnvelope::from_loop_outcome(&LoopOutcome::Exhausted {
            last_diagnostic: diag,
        });
        assert!(env.exhausted);
        assert_eq!(env.text_result, rendered);
    }

    #[test]
    fn runtime_error_renders_its_diagnostic() {
        let diag = sanitize::sanitize("TypeError", "nope", "", "x\n", 0);
        let outcome = ExecutionOutcome::runtime_error("partial stdout".into(), diag);
        let env = OutputEnvelope::from_outcome(&outcome);
        assert!(env.text_result.contains("TypeError: nope"));
        assert!(!env.exhausted);
    }
}
