//! Harness report parsing and failure classification
//!
//! Turns the raw bytes captured from a harness run into a typed
//! [`ExecutionResult`]. The stdout document is never trusted: it must parse,
//! agree with the declared test count, and be internally consistent, or the
//! whole run is classified as malformed.

use serde::Deserialize;

use crate::sandbox::process::RawRun;
use crate::types::{ExecutionResult, FailureKind, TestOutcome, TestStatus};

/// Longest diagnostic string kept in a result
pub(crate) const DIAGNOSTIC_CAP: usize = 400;

/// The single JSON document the harness writes to stdout
#[derive(Debug, Deserialize)]
pub(crate) struct HarnessReport {
    passed: usize,
    total: usize,
    #[serde(default)]
    tests: Vec<HarnessTest>,
    #[serde(default)]
    fault: Option<HarnessFault>,
}

#[derive(Debug, Deserialize)]
struct HarnessTest {
    index: usize,
    status: TestStatus,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    got: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HarnessFault {
    kind: FaultKind,
    detail: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FaultKind {
    Compile,
    Runtime,
}

impl From<FaultKind> for FailureKind {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::Compile => FailureKind::CompileError,
            FaultKind::Runtime => FailureKind::RuntimeError,
        }
    }
}

/// Classify a raw run against the challenge's declared test count
pub(crate) fn classify(raw: RawRun, declared_total: usize) -> ExecutionResult {
    if raw.timed_out {
        return ExecutionResult::failed(FailureKind::Timeout, declared_total, raw.duration);
    }

    if let Some(signal) = raw.signal {
        // Killed by a limit (SIGKILL from the OOM path, SIGXCPU, SIGXFSZ)
        return ExecutionResult::failed(
            FailureKind::ResourceExceeded,
            declared_total,
            raw.duration,
        )
        .with_diagnostic(format!("killed by signal {signal}"));
    }

    let report: HarnessReport = match serde_json::from_slice(&raw.stdout) {
        Ok(report) => report,
        Err(_) => {
            let stderr = truncate(&String::from_utf8_lossy(&raw.stderr));
            let diagnostic = if stderr.is_empty() {
                let exit = raw
                    .exit_code
                    .map_or_else(|| "unknown".to_string(), |c| c.to_string());
                format!("no parsable report (exit code {exit})")
            } else {
                stderr
            };
            return ExecutionResult::failed(
                FailureKind::MalformedOutput,
                declared_total,
                raw.duration,
            )
            .with_diagnostic(diagnostic);
        }
    };

    if let Some(fault) = report.fault {
        return ExecutionResult::failed(fault.kind.into(), declared_total, raw.duration)
            .with_diagnostic(truncate(&fault.detail));
    }

    // The declared count is authoritative; a report that disagrees with it or
    // with itself is not partial credit, it is a broken harness run
    let recomputed = report
        .tests
        .iter()
        .filter(|t| matches!(t.status, TestStatus::Pass))
        .count();
    if report.total != declared_total
        || report.tests.len() != declared_total
        || report.passed != recomputed
    {
        return ExecutionResult::failed(
            FailureKind::MalformedOutput,
            declared_total,
            raw.duration,
        )
        .with_diagnostic("report disagrees with declared test count");
    }

    let tests = report
        .tests
        .into_iter()
        .map(|t| TestOutcome {
            index: t.index,
            status: t.status,
            expected: t.expected.as_deref().map(truncate),
            got: t.got.as_deref().map(truncate),
            detail: t.detail.as_deref().map(truncate),
        })
        .collect();

    ExecutionResult {
        success: true,
        passed: report.passed,
        total: report.total,
        tests,
        failure: FailureKind::None,
        diagnostic: None,
        duration: raw.duration,
    }
}

/// Clamp a diagnostic string to the cap, respecting char boundaries
fn truncate(s: &str) -> String {
    let s = s.trim();
    if s.len() <= DIAGNOSTIC_CAP {
        return s.to_string();
    }
    let mut end = DIAGNOSTIC_CAP;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = s[..end].to_string();
    out.push_str("...");
    out
}


#[cfg(test)]
mod proptests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn classify_never_panics(stdout in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let run = RawRun {
                stdout,
                stderr: Vec::new(),
                timed_out: false,
                exit_code: Some(0),
                signal: None,
                duration: Duration::ZERO,
            };
            let result = classify(run, 5);
            prop_assert!(result.passed <= result.total);
            prop_assert_eq!(result.total, 5);
        }

        #[test]
        fn truncate_never_panics(s in ".*") {
            let out = truncate(&s);
            prop_assert!(out.len() <= DIAGNOSTIC_CAP + 3);
        }
    }
}
