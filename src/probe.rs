//! Bounded external probes.
//!
//! Every helper process the daemon spawns goes through here so that its PID
//! lands in the [`ChildTracker`] and a stuck helper is killed on timeout.

use std::process::Output;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::registry::ProcessRegistry;

/// Errors from a probe. Callers treat all of them as "no evidence".
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with code {code:?}")]
    Failed { program: String, code: Option<i32> },

    #[error("failed to read {what}: {source}")]
    Io {
        what: String,
        source: std::io::Error,
    },

    #[error("unexpected {what} format: {detail}")]
    Parse { what: &'static str, detail: String },
}

/// Writes the PID of every spawned helper into the process registry.
///
/// The PID is on file for as long as the helper runs, so `--stop` can reach
/// it. A tracker without a registry records nothing.
#[derive(Debug, Clone, Default)]
pub struct ChildTracker {
    registry: Option<ProcessRegistry>,
}

impl ChildTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: ProcessRegistry) -> Self {
        Self {
            registry: Some(registry),
        }
    }

    /// Register a freshly spawned helper. Failures are logged only.
    pub fn record(&self, pid: u32) {
        let Some(ref registry) = self.registry else {
            return;
        };
        if let Err(e) = registry.record(&[pid]) {
            warn!("Failed to register helper PID {}: {:#}", pid, e);
        }
    }
}

/// Tools from `names` that are not on `PATH`.
pub fn missing_tools<'a>(names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .copied()
        .filter(|name| which::which(name).is_err())
        .collect()
}

/// Run `program args..` with a hard timeout, capturing stdout.
///
/// The child runs under `LC_ALL=C` and is killed if the timeout expires.
pub async fn run_bounded(
    tracker: &ChildTracker,
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output, ProbeError> {
    trace!("Running probe: {} {}", program, args.join(" "));

    let child = Command::new(program)
        .args(args)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProbeError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if let Some(pid) = child.id() {
        tracker.record(pid);
    }

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| ProbeError::Io {
            what: format!("{program} output"),
            source,
        })?,
        Err(_) => {
            debug!("{} exceeded {:?}, killed", program, timeout);
            return Err(ProbeError::Timeout {
                program: program.to_string(),
                timeout,
            });
        }
    };

    if output.status.success() {
        Ok(output)
    } else {
        Err(ProbeError::Failed {
            program: program.to_string(),
            code: output.status.code(),
        })
    }
}
