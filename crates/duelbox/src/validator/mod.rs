//! Static submission screening
//!
//! Parses submitted source into a full syntax tree and walks every node,
//! denying imports and calls that could reach outside the sandbox. This runs
//! in-process before any child is spawned; the OS resource limits applied at
//! spawn time are an independent second layer, not an alternative.
//!
//! The check fails closed: source that does not parse is rejected outright.

use rustpython_parser::{Parse, ast};
use thiserror::Error;

mod walk;

/// Modules whose import is denied at any depth
///
/// Covers process control, filesystem, network, dynamic import, reflection,
/// FFI, and concurrency primitives. Only the first dotted segment of an
/// import path is consulted, so `os.path` is caught by `os`.
pub const DENIED_MODULES: &[&str] = &[
    "asyncio",
    "builtins",
    "code",
    "codeop",
    "concurrent",
    "crypt",
    "ctypes",
    "fcntl",
    "ftplib",
    "gc",
    "glob",
    "grp",
    "http",
    "importlib",
    "inspect",
    "io",
    "mmap",
    "modulefinder",
    "multiprocessing",
    "os",
    "pathlib",
    "pickle",
    "pkgutil",
    "platform",
    "pty",
    "pwd",
    "requests",
    "resource",
    "runpy",
    "select",
    "selectors",
    "shutil",
    "signal",
    "smtplib",
    "socket",
    "ssl",
    "subprocess",
    "sys",
    "sysconfig",
    "tempfile",
    "threading",
    "tracemalloc",
    "urllib",
    "webbrowser",
];

/// Builtins whose invocation is denied, whether reached by bare name or
/// through an attribute chain (`builtins.eval` and friends)
pub const DENIED_BUILTINS: &[&str] = &[
    "__import__",
    "breakpoint",
    "compile",
    "delattr",
    "eval",
    "exec",
    "getattr",
    "globals",
    "input",
    "locals",
    "memoryview",
    "open",
    "setattr",
    "vars",
];

/// Attribute names that act as escape hatches into the interpreter internals
pub const DENIED_ATTRIBUTES: &[&str] = &[
    "__bases__",
    "__builtins__",
    "__class__",
    "__closure__",
    "__code__",
    "__dict__",
    "__getattr__",
    "__getattribute__",
    "__globals__",
    "__import__",
    "__mro__",
    "__subclasses__",
];

/// Why a submission was refused before execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("code exceeds maximum allowed length ({actual} > {limit} bytes)")]
    TooLong { actual: usize, limit: usize },

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("import of denied module '{0}'")]
    DeniedImport(String),

    #[error("relative imports are not allowed")]
    RelativeImport,

    #[error("call to denied builtin '{0}'")]
    DeniedCall(String),

    #[error("reference to denied builtin '{0}'")]
    DeniedReference(String),

    #[error("access to denied attribute '{0}'")]
    DeniedAttribute(String),
}

/// Check a submission against the capability policy
///
/// Returns `Ok(())` only for source that parses cleanly and contains no
/// denied import, call, or attribute access anywhere in its syntax tree.
pub fn validate(code: &str, max_len: usize) -> Result<(), RejectReason> {
    if code.len() > max_len {
        return Err(RejectReason::TooLong {
            actual: code.len(),
            limit: max_len,
        });
    }

    let suite = ast::Suite::parse(code, "<submission>")
        .map_err(|e| RejectReason::Syntax(e.to_string()))?;

    for stmt in &suite {
        walk::check_stmt(stmt)?;
    }

    Ok(())
}

fn denied_module(name: &str) -> Option<&'static str> {
    let top_level = name.split('.').next().unwrap_or(name);
    DENIED_MODULES.iter().copied().find(|m| *m == top_level)
}

fn denied_builtin(name: &str) -> Option<&'static str> {
    DENIED_BUILTINS.iter().copied().find(|b| *b == name)
}

fn denied_attribute(name: &str) -> Option<&'static str> {
    DENIED_ATTRIBUTES.iter().copied().find(|a| *a == name)
}
