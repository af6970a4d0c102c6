//! Sandboxed execution of untrusted submissions
//!
//! Each submission runs as a freshly spawned Python process, never in the
//! host process. Defense is layered: the validator screens the syntax tree
//! before anything spawns, the child gets OS resource limits between fork and
//! exec, the parent enforces the wall clock independently, and output is
//! captured through capped buffers.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{Challenge, Config};
use crate::types::{ExecutionResult, FailureKind, ResourceLimits};
use crate::validator;

pub(crate) mod harness;
pub(crate) mod process;
pub(crate) mod report;

/// Errors from the host side of a sandboxed run
///
/// Submission failures never surface here; they are classified into the
/// returned [`ExecutionResult`]. This enum covers only faults in our own
/// machinery (temp files, spawning).
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to write harness script: {0}")]
    HarnessFile(#[source] std::io::Error),

    #[error("failed to encode harness payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to spawn interpreter: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executor for sandboxed submission runs
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: Arc<Config>,
}

impl Sandbox {
    /// Create a new sandbox with the given configuration
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Create a sandbox sharing an existing configuration
    pub fn from_shared(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a submission against a challenge's test cases
    ///
    /// The submission is screened by the validator first; a policy rejection
    /// is returned as a `forbidden-construct` result without spawning
    /// anything. `limits` merges over the challenge's effective limits.
    ///
    /// # Errors
    ///
    /// Only host-side faults (harness file I/O, spawn failure) produce an
    /// error; everything the submission itself does wrong is classified into
    /// the result.
    #[instrument(skip(self, code, challenge, limits), fields(challenge = %challenge.name))]
    pub async fn execute(
        &self,
        code: &str,
        challenge: &Challenge,
        limits: Option<&ResourceLimits>,
    ) -> Result<ExecutionResult, SandboxError> {
        let total = challenge.test_count();

        if let Err(reason) = validator::validate(code, self.config.max_code_length_bytes) {
            debug!(%reason, "submission rejected before spawn");
            return Ok(ExecutionResult::failed(
                FailureKind::ForbiddenConstruct,
                total,
                Duration::ZERO,
            )
            .with_diagnostic(reason.to_string()));
        }

        let mut effective_limits = self.config.challenge_limits(challenge);
        if let Some(overrides) = limits {
            effective_limits = effective_limits.with_overrides(overrides);
        }

        let script = harness::build_harness(code, &challenge.tests, &challenge.entry_point)?;
        let raw =
            process::run_harness(&self.config.python_binary(), &script, &effective_limits).await?;
        let result = report::classify(raw, total);

        debug!(
            passed = result.passed,
            total = result.total,
            failure = %result.failure,
            duration_ms = result.duration.as_millis() as u64,
            "execution complete"
        );

        Ok(result)
    }
}
