//! Bounded self-correction loop.
//!
//! Runtime failures stay inside the loop: each one is sanitized, recorded,
//! and handed to the code generator as the seed for the next candidate,
//! up to a fixed attempt budget. Only success or exhaustion crosses back
//! to the caller. Infrastructure failures are different: the loop has no
//! basis for deciding whether to retry a broken transport, so they
//! propagate immediately and consume no attempt.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ExecError;
use crate::exec::{CodeTask, ExecutionOutcome, Executor, OutcomeStatus};
use crate::sanitize::SanitizedError;

pub const MAX_ATTEMPTS: usize = 5;

/// Rounds of failure context retained for the generator. Once this many
/// are held, the oldest is dropped before a new one is appended, so retry
/// context cannot grow without bound while the most recent failure is
/// always preserved.
const HISTORY_RETAINED: usize = 2;

/// One failed execution and its diagnostic.
#[derive(Debug, Clone)]
pub struct CorrectionRound {
    pub code: String,
    pub diagnostic: SanitizedError,
}

/// Per-task-lineage retry state. Owned by the caller, mutated only here.
#[derive(Debug)]
pub struct CorrectionSession {
    attempts: usize,
    max_attempts: usize,
    history: Vec<CorrectionRound>,
}

impl Default for CorrectionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrectionSession {
    pub fn new() -> Self {
        Self {
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            history: Vec::new(),
        }
    }

    pub fn with_max_attempts(max_attempts: usize) -> Result<Self, ExecError> {
        if max_attempts == 0 {
            return Err(ExecError::Config("max_attempts must be at least 1".into()));
        }
        Ok(Self {
            max_attempts,
            ..Self::new()
        })
    }

    /// Budget from the `MAX_ATTEMPTS` config key, falling back to the
    /// built-in default when unset.
    pub fn from_config(cfg: &Config) -> Result<Self, ExecError> {
        match cfg.get_usize("MAX_ATTEMPTS") {
            Some(n) => Self::with_max_attempts(n),
            None => Ok(Self::new()),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn history(&self) -> &[CorrectionRound] {
        &self.history
    }

    fn record_failure(&mut self, code: String, diagnostic: SanitizedError) {
        if self.history.len() >= HISTORY_RETAINED {
            self.history.remove(0);
        }
        self.history.push(CorrectionRound { code, diagnostic });
    }
}

/// Supplies replacement code candidates. Implemented by the out-of-scope
/// generation layer; the loop only ever hands it the rendered diagnostic
/// of the latest failure.
#[async_trait]
pub trait CodeGenerator: Send {
    /// `None` (or empty) means the generator had nothing executable to
    /// offer for this diagnostic.
    async fn next_candidate(&mut self, diagnostic: &str) -> anyhow::Result<Option<String>>;

    /// Called before each re-invocation so the generator's owner can strip
    /// stale tool-call bookkeeping from its conversation context. The loop
    /// triggers this step but does not own the context.
    fn prune_context(&mut self) {}
}

/// Pull the first fenced code block out of a generator reply, tolerating a
/// language tag after the opening fence. Returns the whole reply when no
/// fence is present and it does not read like prose markup.
pub fn extract_code_block(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let end = body.find("```").unwrap_or(body.len());
        let code = body[..end].trim_end();
        return (!code.is_empty()).then(|| code.to_string());
    }
    Some(trimmed.to_string())
}

#[derive(Debug)]
pub enum LoopOutcome {
    Success(ExecutionOutcome),
    /// The attempt budget ran out. Carries the last diagnostic so the
    /// caller can surface it alongside an explicit exhaustion signal,
    /// never as a silent partial result.
    Exhausted { last_diagnostic: SanitizedError },
}

/// Drive `task` to success or exhaustion against `executor`.
///
/// State machine: Idle -> Running -> {Success, Retry -> Running, Exhausted};
/// at most `session.max_attempts()` executions ever happen for one session.
pub async fn run_correction<E, G>(
    task: &CodeTask,
    executor: &E,
    generator: &mut G,
    session: &mut CorrectionSession,
) -> Result<LoopOutcome, ExecError>
where
    E: Executor + ?Sized,
    G: CodeGenerator,
{
    let mut code = task.source_code.clone();
    loop {
        if session.attempts >= session.max_attempts {
            return match session.history.last() {
                Some(round) => Ok(LoopOutcome::Exhausted {
                    last_diagnostic: round.diagnostic.clone(),
                }),
                None => Err(ExecError::Config(
                    "correction session budget already exhausted".into(),
                )),
            };
        }

        let attempt_task = task.with_source(code.clone());
        // Infrastructure failures propagate here without touching the
        // attempt budget.
        let outcome = executor.execute(&attempt_task).await?;
        session.attempts += 1;

        match outcome.status {
            OutcomeStatus::Success => {
                debug!(attempts = session.attempts, "execution succeeded");
                session.history.clear();
                return Ok(LoopOutcome::Success(outcome));
            }
            OutcomeStatus::InfrastructureError => {
                return Err(ExecError::Infrastructure(
                    "executor reported an infrastructure failure".into(),
                ));
            }
            OutcomeStatus::RuntimeError => {
                let diagnostic = outcome.diagnostic.clone().ok_or_else(|| {
                    ExecError::Infrastructure("runtime failure carried no diagnostic".into())
                })?;
                session.record_failure(code.clone(), diagnostic.clone());
                info!(
                    attempt = session.attempts,
                    error_type = %diagnostic.error_type,
                    "attempt failed; recorded correction round"
                );
                if session.attempts >= session.max_attempts {
                    warn!(attempts = session.attempts, "correction budget exhausted");
                    return Ok(LoopOutcome::Exhausted {
                        last_diagnostic: diagnostic,
                    });
                }
                generator.prune_context();
                let next = generator
                    .next_candidate(&diagnostic.rendered)
                    .await
                    .map_err(|e| ExecError::Infrastructure(format!("code generator: {e}")))?;
                match next {
                    Some(candidate) if !candidate.trim().is_empty() => code = candidate,
                    _ => {
                        // Matches the long-standing behavior upstream of
                        // this loop: a reply with no extractable code is
                        // treated as a conversational answer, not as a
                        // failed round. Logged so a silent extraction bug
                        // cannot hide here.
                        warn!("generator produced no code; treating reply as final answer");
                        return Ok(LoopOutcome::Success(ExecutionOutcome::empty_answer()));
                    }
                }
            }
        }
    }
}
