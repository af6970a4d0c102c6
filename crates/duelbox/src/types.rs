use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Wall clock time limit in seconds, enforced by the parent process
    #[serde(default)]
    pub wall_time_limit: Option<f64>,

    /// CPU time limit in seconds (RLIMIT_CPU)
    #[serde(default)]
    pub cpu_time_limit: Option<f64>,

    /// Address space limit in bytes (RLIMIT_AS)
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// Maximum number of processes/threads (RLIMIT_NPROC)
    #[serde(default)]
    pub max_processes: Option<u32>,

    /// Maximum captured output in bytes per stream
    #[serde(default)]
    pub max_output: Option<u64>,

    /// Maximum open files (RLIMIT_NOFILE)
    #[serde(default)]
    pub max_open_files: Option<u32>,
}

impl ResourceLimits {
    /// 1 kilobyte in bytes
    pub const KB: u64 = 1024;
    /// 1 megabyte in bytes
    pub const MB: u64 = 1024 * 1024;

    /// Create new resource limits with all fields set to None
    pub fn none() -> Self {
        Self {
            wall_time_limit: None,
            cpu_time_limit: None,
            memory_limit: None,
            max_processes: None,
            max_output: None,
            max_open_files: None,
        }
    }

    /// Create new resource limits with the default ceilings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall clock time limit in seconds
    pub fn with_wall_time_limit(mut self, seconds: f64) -> Self {
        self.wall_time_limit = Some(seconds);
        self
    }

    /// Set the CPU time limit in seconds
    pub fn with_cpu_time_limit(mut self, seconds: f64) -> Self {
        self.cpu_time_limit = Some(seconds);
        self
    }

    /// Set the memory limit in bytes
    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Set the maximum number of processes
    pub fn with_max_processes(mut self, count: u32) -> Self {
        self.max_processes = Some(count);
        self
    }

    /// Set the maximum captured output in bytes
    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output = Some(bytes);
        self
    }

    /// Set the maximum number of open files
    pub fn with_max_open_files(mut self, count: u32) -> Self {
        self.max_open_files = Some(count);
        self
    }

    /// Apply overrides from another ResourceLimits, preferring values from `overrides`
    ///
    /// Returns a new ResourceLimits with values from `overrides` taking precedence
    /// over values from `self` when both are present.
    pub fn with_overrides(&self, overrides: &ResourceLimits) -> ResourceLimits {
        ResourceLimits {
            wall_time_limit: overrides.wall_time_limit.or(self.wall_time_limit),
            cpu_time_limit: overrides.cpu_time_limit.or(self.cpu_time_limit),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
            max_processes: overrides.max_processes.or(self.max_processes),
            max_output: overrides.max_output.or(self.max_output),
            max_open_files: overrides.max_open_files.or(self.max_open_files),
        }
    }

    /// Wall clock budget as a Duration, falling back to the default when unset
    pub fn wall_time_budget(&self) -> Duration {
        Duration::from_secs_f64(self.wall_time_limit.unwrap_or(5.0).max(0.0))
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time_limit: Some(5.0),
            cpu_time_limit: Some(5.0),
            memory_limit: Some(128 * Self::MB),
            max_processes: Some(1),
            max_output: Some(64 * Self::KB),
            max_open_files: Some(16),
        }
    }
}

/// Why a submission run did not produce a clean report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailureKind {
    /// The run completed and produced a well-formed report
    #[default]
    #[serde(rename = "none")]
    None,

    /// The validator denied the submission before anything was spawned
    #[serde(rename = "forbidden-construct")]
    ForbiddenConstruct,

    /// The submission failed to compile inside the harness
    #[serde(rename = "compile-error")]
    CompileError,

    /// The submission raised outside any individual test
    #[serde(rename = "runtime-error")]
    RuntimeError,

    /// The wall clock ceiling was hit and the process group was killed
    #[serde(rename = "timeout")]
    Timeout,

    /// The child was killed by a resource limit (memory, CPU, output)
    #[serde(rename = "resource-exceeded")]
    ResourceExceeded,

    /// The harness emitted output that could not be parsed as a report
    #[serde(rename = "malformed-output")]
    MalformedOutput,
}

impl FailureKind {
    /// Check if this kind represents a failed run
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !matches!(self, FailureKind::None)
    }

    /// Whether a retry of the identical submission could plausibly succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout | FailureKind::ResourceExceeded | FailureKind::MalformedOutput
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::None => "none",
            FailureKind::ForbiddenConstruct => "forbidden-construct",
            FailureKind::CompileError => "compile-error",
            FailureKind::RuntimeError => "runtime-error",
            FailureKind::Timeout => "timeout",
            FailureKind::ResourceExceeded => "resource-exceeded",
            FailureKind::MalformedOutput => "malformed-output",
        };
        write!(f, "{s}")
    }
}

/// Verdict for a single test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// The entry point returned the expected value
    Pass,
    /// The entry point returned a different value
    Fail,
    /// The entry point raised an exception
    Error,
}

/// Outcome of one test case, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// 1-based test number
    pub index: usize,

    /// Pass, fail, or error
    pub status: TestStatus,

    /// Expected value rendered by the harness (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,

    /// Actual value rendered by the harness (failures only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub got: Option<String>,

    /// Truncated diagnostic (errors only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TestOutcome {
    /// A passing outcome for the given 1-based test number
    pub fn pass(index: usize) -> Self {
        Self {
            index,
            status: TestStatus::Pass,
            expected: None,
            got: None,
            detail: None,
        }
    }
}

/// Result of running one submission against a challenge's test cases
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the run completed and produced a clean report
    pub success: bool,

    /// Number of passing test cases
    pub passed: usize,

    /// Declared number of test cases for the challenge
    pub total: usize,

    /// Per-test outcomes, in declaration order (empty for global failures)
    pub tests: Vec<TestOutcome>,

    /// Failure classification for the run as a whole
    pub failure: FailureKind,

    /// Truncated diagnostic for run-level failures (never per-test detail)
    pub diagnostic: Option<String>,

    /// Wall clock time spent, including spawn overhead
    pub duration: Duration,
}

impl ExecutionResult {
    /// A failed run with zero passing tests
    pub fn failed(failure: FailureKind, total: usize, duration: Duration) -> Self {
        Self {
            success: false,
            passed: 0,
            total,
            tests: Vec::new(),
            failure,
            diagnostic: None,
            duration,
        }
    }

    /// Attach a run-level diagnostic
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// Check if every declared test passed
    #[must_use]
    pub fn is_full_pass(&self) -> bool {
        self.success && self.total > 0 && self.passed == self.total
    }
}
