//! Bounded execution pool
//!
//! Gates sandboxed runs behind a fixed number of permits so the number of
//! live child processes is capped no matter how fast submissions arrive.
//! Excess jobs wait their turn in FIFO order on the semaphore; a slow
//! submission delays only jobs behind it in that queue, never the caller's
//! own event loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, error, instrument};

use crate::config::{Challenge, Config};
use crate::sandbox::Sandbox;
use crate::types::{ExecutionResult, FailureKind, ResourceLimits};

/// One queued submission run
#[derive(Debug)]
pub struct ExecutionJob {
    /// Submitted source text
    pub code: String,

    /// Challenge whose test cases the submission runs against
    pub challenge: Challenge,

    /// Optional limit overrides (merged over the challenge's limits)
    pub limits: Option<ResourceLimits>,
}

/// Pool of execution slots for concurrent sandboxed runs
#[derive(Debug, Clone)]
pub struct ExecutionPool {
    sandbox: Sandbox,
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ExecutionPool {
    /// Create a new pool with an explicit slot count
    pub fn new(sandbox: Sandbox, max_concurrent: usize) -> Self {
        let capacity = max_concurrent.max(1);
        Self {
            sandbox,
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Create a pool from a configuration
    pub fn from_config(config: Config) -> Self {
        let capacity = config.max_concurrent_executions;
        Self::new(Sandbox::new(config), capacity)
    }

    /// Submit a job without blocking; the receiver resolves when it finishes
    ///
    /// Host-side sandbox faults are logged and delivered to the receiver as a
    /// generic failed result, so callers only ever observe an
    /// [`ExecutionResult`]. Dropping the receiver abandons the job's result
    /// but does not cancel the run.
    #[instrument(skip(self, job), fields(challenge = %job.challenge.name))]
    pub fn submit(&self, job: ExecutionJob) -> oneshot::Receiver<ExecutionResult> {
        let (tx, rx) = oneshot::channel();
        let sandbox = self.sandbox.clone();
        let semaphore = self.semaphore.clone();

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed while the pool is alive
                Err(_) => return,
            };
            debug!("execution slot acquired");

            let result = match sandbox
                .execute(&job.code, &job.challenge, job.limits.as_ref())
                .await
            {
                Ok(result) => result,
                Err(error) => {
                    error!(%error, "sandbox run failed on the host side");
                    ExecutionResult::failed(
                        FailureKind::RuntimeError,
                        job.challenge.test_count(),
                        Duration::ZERO,
                    )
                    .with_diagnostic("execution failed, please resubmit")
                }
            };

            // The receiver may be gone (caller shut down); that is fine
            let _ = tx.send(result);
        });

        rx
    }

    /// Submit a job and wait for its result
    pub async fn run(&self, job: ExecutionJob) -> ExecutionResult {
        let total = job.challenge.test_count();
        match self.submit(job).await {
            Ok(result) => result,
            // The worker task was torn down mid-run (runtime shutdown)
            Err(_) => ExecutionResult::failed(FailureKind::RuntimeError, total, Duration::ZERO)
                .with_diagnostic("execution was interrupted"),
        }
    }

    /// Number of currently free execution slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Total number of execution slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(python_path: &str) -> ExecutionPool {
        let config = Config {
            python_path: Some(python_path.into()),
            max_concurrent_executions: 2,
            ..Config::default()
        };
        ExecutionPool::from_config(config)
    }

    fn palindrome_job(code: &str) -> ExecutionJob {
        let config = Config::default();
        ExecutionJob {
            code: code.to_string(),
            challenge: config.get_challenge("palindrome").unwrap().clone(),
            limits: None,
        }
    }

    #[test]
    fn pool_capacity_is_clamped_to_one() {
        let pool = ExecutionPool::new(Sandbox::new(Config::default()), 0);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn pool_reports_capacity_and_availability() {
        let pool = test_pool("/nonexistent/python3");
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn rejected_submission_flows_through_pool() {
        // Validator rejections resolve without ever needing an interpreter
        let pool = test_pool("/nonexistent/python3");
        let result = pool.run(palindrome_job("import os\n")).await;

        assert_eq!(result.failure, FailureKind::ForbiddenConstruct);
        assert_eq!(result.passed, 0);
    }

    #[tokio::test]
    async fn host_fault_becomes_generic_failure() {
        // A missing interpreter is a host-side fault; the caller still gets a
        // typed result rather than an error or a hang
        let pool = test_pool("/nonexistent/python3");
        let result = pool
            .run(palindrome_job("def is_palindrome(s):\n    return True\n"))
            .await;

        assert_eq!(result.failure, FailureKind::RuntimeError);
        assert_eq!(result.passed, 0);
        assert_eq!(result.total, 5);
        assert!(result.diagnostic.is_some());
    }

    #[tokio::test]
    async fn submissions_do_not_block_the_caller() {
        let pool = test_pool("/nonexistent/python3");
        // submit returns immediately even with more jobs than slots
        let receivers: Vec<_> = (0..8)
            .map(|_| pool.submit(palindrome_job("import os\n")))
            .collect();
        for rx in receivers {
            let result = rx.await.unwrap();
            assert_eq!(result.failure, FailureKind::ForbiddenConstruct);
        }
    }
}
