//! Harness script generation
//!
//! Builds the self-contained Python program that runs a submission against a
//! challenge's test cases. The submission source and the test cases are both
//! embedded as JSON string literals, so submission text can never alter the
//! structure of the harness itself. The harness writes exactly one JSON
//! document to stdout; everything else goes to stderr.

use serde::Serialize;

use crate::config::{EntryPoint, TestCase};

/// Fixed prelude: imports and the single-document emitter
const PRELUDE: &str = r#"import json
import sys
import traceback


def _clip(text, cap=400):
    text = str(text)
    if len(text) <= cap:
        return text
    return text[:cap] + "..."


def _emit(payload):
    sys.stdout.write(json.dumps(payload))
    sys.stdout.flush()


"#;

/// Fixed driver: compiles the submission, runs each case, emits the report
const DRIVER: &str = r#"

_CASES = json.loads(_CASES_JSON)

try:
    _compiled = compile(_SOURCE, "<submission>", "exec")
except (SyntaxError, ValueError):
    _emit({"passed": 0, "total": len(_CASES), "tests": [],
           "fault": {"kind": "compile", "detail": _clip(traceback.format_exc(limit=0))}})
    sys.exit(0)

_namespace = {"__name__": "__duel__"}
try:
    exec(_compiled, _namespace)
except BaseException:
    _emit({"passed": 0, "total": len(_CASES), "tests": [],
           "fault": {"kind": "runtime", "detail": _clip(traceback.format_exc(limit=3))}})
    sys.exit(0)

_fn = _namespace.get(_ENTRY)
if not callable(_fn):
    _emit({"passed": 0, "total": len(_CASES), "tests": [],
           "fault": {"kind": "runtime",
                     "detail": "entry point '%s' is not defined" % _ENTRY}})
    sys.exit(0)

_results = []
_passed = 0
for _i, _case in enumerate(_CASES):
    _args = _case["input"]
    _expected = _case["expected"]
    try:
        if isinstance(_args, list):
            _got = _fn(*_args)
        else:
            _got = _fn(_args)
        if _got == _expected:
            _passed += 1
            _results.append({"index": _i + 1, "status": "pass"})
        else:
            _results.append({"index": _i + 1, "status": "fail",
                             "expected": _clip(repr(_expected)),
                             "got": _clip(repr(_got))})
    except BaseException:
        _results.append({"index": _i + 1, "status": "error",
                         "detail": _clip(traceback.format_exc(limit=2))})

_emit({"passed": _passed, "total": len(_CASES), "tests": _results, "fault": None})
"#;

/// Test case as shipped to the harness (input and expected value only)
#[derive(Serialize)]
struct WireCase<'a> {
    input: &'a serde_json::Value,
    expected: &'a serde_json::Value,
}

/// Render the complete harness program for one submission
///
/// The three variable parts are appended as assignments between the fixed
/// prelude and driver; each is a JSON-encoded string literal (valid Python),
/// so no quoting in the submission or the test data can escape it.
pub(crate) fn build_harness(
    code: &str,
    tests: &[TestCase],
    entry_point: &EntryPoint,
) -> Result<String, serde_json::Error> {
    let cases: Vec<WireCase> = tests
        .iter()
        .map(|t| WireCase {
            input: &t.input,
            expected: &t.expected,
        })
        .collect();
    let cases_json = serde_json::to_string(&cases)?;

    let mut script = String::with_capacity(PRELUDE.len() + DRIVER.len() + code.len() + 256);
    script.push_str(PRELUDE);
    script.push_str("_SOURCE = ");
    script.push_str(&serde_json::to_string(code)?);
    script.push('\n');
    script.push_str("_CASES_JSON = ");
    script.push_str(&serde_json::to_string(&cases_json)?);
    script.push('\n');
    script.push_str("_ENTRY = ");
    script.push_str(&serde_json::to_string(entry_point.as_str())?);
    script.push('\n');
    script.push_str(DRIVER);
    Ok(script)
}
