//! Child process management for sandboxed runs
//!
//! Spawns the harness as a fresh OS process with resource limits applied
//! between fork and exec, reads its output through capped buffers, and kills
//! the whole process group when the wall clock budget runs out.

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::sandbox::SandboxError;
use crate::types::ResourceLimits;

/// Raw outcome of one harness run, before classification
#[derive(Debug)]
pub(crate) struct RawRun {
    /// Captured stdout, truncated at the output cap
    pub stdout: Vec<u8>,

    /// Captured stderr, truncated at the output cap
    pub stderr: Vec<u8>,

    /// Whether the wall clock budget expired and the group was killed
    pub timed_out: bool,

    /// Exit code, if the child exited normally
    pub exit_code: Option<i32>,

    /// Signal number, if the child was killed by a signal
    pub signal: Option<i32>,

    /// Wall clock time from spawn to exit (or to the kill)
    pub duration: Duration,
}

/// Run a rendered harness script under the given limits
#[instrument(skip(python, script, limits))]
pub(crate) async fn run_harness(
    python: &Path,
    script: &str,
    limits: &ResourceLimits,
) -> Result<RawRun, SandboxError> {
    // The temp file must outlive the child; dropping it unlinks the script.
    let mut script_file = tempfile::Builder::new()
        .prefix("duelbox-")
        .suffix(".py")
        .tempfile()
        .map_err(SandboxError::HarnessFile)?;
    script_file
        .write_all(script.as_bytes())
        .map_err(SandboxError::HarnessFile)?;
    script_file.flush().map_err(SandboxError::HarnessFile)?;

    let output_cap = limits.max_output.unwrap_or(64 * ResourceLimits::KB) as usize;
    let budget = limits.wall_time_budget();

    let mut command = Command::new(python);
    command
        .arg(script_file.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .env_clear()
        .env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .env("PYTHONHASHSEED", "0")
        .env("PYTHONDONTWRITEBYTECODE", "1")
        .kill_on_drop(true);
    apply_rlimits(&mut command, limits);

    debug!(python = %python.display(), ?budget, "spawning harness");

    let start = Instant::now();
    let mut child = command.spawn().map_err(SandboxError::SpawnFailed)?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    // Both pipes drain concurrently so neither can back up and stall the
    // child against a full buffer
    let io_task = async {
        tokio::join!(
            read_capped(stdout, output_cap),
            read_capped(stderr, output_cap),
        )
    };

    let run = async {
        let (status, (out, err)) = tokio::join!(child.wait(), io_task);
        (status, out, err)
    };

    match tokio::time::timeout(budget, run).await {
        Ok((status, out, err)) => {
            let status = status?;
            let duration = start.elapsed();
            let exit_code = status.code();
            let signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            };
            debug!(?exit_code, ?signal, ?duration, "harness exited");
            Ok(RawRun {
                stdout: out?,
                stderr: err?,
                timed_out: false,
                exit_code,
                signal,
                duration,
            })
        }
        Err(_) => {
            warn!(?budget, "wall clock budget expired, killing process group");
            kill_process_group(pid);
            let _ = child.kill().await;
            let _ = child.wait().await;
            Ok(RawRun {
                stdout: Vec::new(),
                stderr: Vec::new(),
                timed_out: true,
                exit_code: None,
                signal: None,
                duration: start.elapsed(),
            })
        }
    }
}

/// Apply OS resource limits between fork and exec
///
/// The child also gets its own process group so a later kill reaches any
/// process it managed to create despite RLIMIT_NPROC.
fn apply_rlimits(command: &mut Command, limits: &ResourceLimits) {
    let memory = limits.memory_limit;
    let cpu_secs = limits
        .cpu_time_limit
        .map(|s| s.ceil().max(1.0) as libc::rlim_t);
    let max_processes = limits.max_processes.map(libc::rlim_t::from);
    let max_open_files = limits.max_open_files.map(libc::rlim_t::from);
    let max_file_size = limits.max_output.map(|b| b as libc::rlim_t);

    unsafe {
        command.pre_exec(move || {
            if let Some(bytes) = memory {
                let lim_as = libc::rlimit {
                    rlim_cur: bytes as libc::rlim_t,
                    rlim_max: bytes as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_AS, &lim_as) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if let Some(secs) = cpu_secs {
                let lim_cpu = libc::rlimit {
                    rlim_cur: secs,
                    rlim_max: secs,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &lim_cpu) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if let Some(count) = max_open_files {
                let lim_nofile = libc::rlimit {
                    rlim_cur: count,
                    rlim_max: count,
                };
                if libc::setrlimit(libc::RLIMIT_NOFILE, &lim_nofile) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if let Some(bytes) = max_file_size {
                let lim_fsize = libc::rlimit {
                    rlim_cur: bytes,
                    rlim_max: bytes,
                };
                if libc::setrlimit(libc::RLIMIT_FSIZE, &lim_fsize) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            // NPROC counts processes per user, not per tree, so this can
            // fail on busy hosts; best effort (exec itself does not fork)
            if let Some(count) = max_processes {
                let lim_nproc = libc::rlimit {
                    rlim_cur: count,
                    rlim_max: count,
                };
                let _ = libc::setrlimit(libc::RLIMIT_NPROC, &lim_nproc);
            }
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

/// SIGKILL the child's process group (it called setpgid in pre_exec)
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            let _ = libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

/// Read a stream to the end, keeping at most `cap` bytes
///
/// The stream keeps draining after the cap so the child never blocks on a
/// full pipe; the surplus is discarded.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    cap: usize,
) -> std::io::Result<Vec<u8>> {
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        if buf.len() < cap {
            let take = n.min(cap - buf.len());
            buf.extend_from_slice(&chunk[..take]);
        }
    }
    Ok(buf)
}
