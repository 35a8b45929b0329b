//! PID registry file.
//!
//! One PID per line: the daemon itself first, then every helper it spawned.
//! An external stop command signals everything listed here.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::process;

/// Most recent entries kept after a cleanup pass.
pub const MAX_TRACKED_PIDS: usize = 50;

/// File-backed set of PIDs owned by this daemon.
#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    path: PathBuf,
}

impl ProcessRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a fresh registry holding only `own_pid`.
    pub fn start(&self, own_pid: u32) -> Result<()> {
        fs::write(&self.path, format!("{own_pid}\n"))
            .with_context(|| format!("Failed to write PID file: {}", self.path.display()))?;
        info!("Daemon PID {} saved to {}", own_pid, self.path.display());
        Ok(())
    }

    /// Read the registered PIDs. A missing file is an empty registry.
    pub fn pids(&self) -> Result<Vec<u32>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(parse_pids(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read PID file: {}", self.path.display())),
        }
    }

    /// Append helper PIDs spawned since the last cycle.
    pub fn record(&self, pids: &[u32]) -> Result<()> {
        if pids.is_empty() {
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open PID file: {}", self.path.display()))?;

        let mut lines = String::new();
        for pid in pids {
            lines.push_str(&pid.to_string());
            lines.push('\n');
        }
        file.write_all(lines.as_bytes())
            .with_context(|| format!("Failed to append to PID file: {}", self.path.display()))?;

        debug!("Registered {} helper PID(s)", pids.len());
        Ok(())
    }

    /// Drop PIDs whose process is gone, then keep only the newest entries.
    pub fn cleanup(&self) -> Result<()> {
        self.cleanup_with(process::is_alive)
    }

    /// Cleanup with a custom liveness check.
    pub fn cleanup_with(&self, is_alive: impl Fn(u32) -> bool) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let before = self.pids()?;
        let after = retain_live(&before, is_alive, MAX_TRACKED_PIDS);

        if after.len() != before.len() {
            debug!("Pruned PID registry: {} -> {}", before.len(), after.len());
        }

        write_atomically(&self.path, &after)
    }

    /// Cleanup that only logs failures; the cycle carries on without PID tracking.
    pub fn prune(&self) {
        if let Err(e) = self.cleanup() {
            warn!("PID registry cleanup failed: {:#}", e);
        }
    }

    /// Stop every registered PID except `own_pid`, then delete the file.
    ///
    /// Processes still alive `grace` after SIGTERM get SIGKILL. Returns how
    /// many processes were signalled.
    pub async fn stop(&self, own_pid: u32, grace: Duration) -> Result<usize> {
        let pids: Vec<u32> = self
            .pids()?
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .collect();
        let signalled = process::terminate_all(&pids, grace).await;
        debug!("Signalled {} registered process(es)", signalled);

        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove PID file: {}", self.path.display())
                });
            }
        }

        Ok(signalled)
    }
}

/// Parse one PID per line, skipping junk.
fn parse_pids(content: &str) -> Vec<u32> {
    content
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .filter(|pid| *pid > 0)
        .collect()
}

/// Keep live PIDs, then the last `cap` of them.
fn retain_live(pids: &[u32], is_alive: impl Fn(u32) -> bool, cap: usize) -> Vec<u32> {
    let live: Vec<u32> = pids.iter().copied().filter(|pid| is_alive(*pid)).collect();
    let skip = live.len().saturating_sub(cap);
    live[skip..].to_vec()
}

/// Replace the file contents via a sibling temp file and rename.
fn write_atomically(path: &Path, pids: &[u32]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let mut content = String::new();
    for pid in pids {
        content.push_str(&pid.to_string());
        content.push('\n');
    }

    fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
