//! Process table access through `/proc`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::signal::kill;
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use tracing::debug;
use tracing::warn;

const PROC_ROOT: &str = "/proc";

/// How often [`terminate_all`] checks whether its targets are gone.
const EXIT_POLL: Duration = Duration::from_millis(100);

/// A running process, as far as name matching is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// List every process whose command name can be read.
pub fn list_processes() -> Vec<ProcessEntry> {
    list_processes_in(Path::new(PROC_ROOT))
}

fn list_processes_in(root: &Path) -> Vec<ProcessEntry> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let pid = entry.file_name().to_str()?.parse::<u32>().ok()?;
            let name = fs::read_to_string(entry.path().join("comm")).ok()?;
            Some(ProcessEntry {
                pid,
                name: name.trim_end().to_string(),
            })
        })
        .collect()
}

/// First process (other than `exclude`) whose name satisfies `matches`.
pub fn find_process(exclude: u32, matches: impl Fn(&str) -> bool) -> Option<ProcessEntry> {
    list_processes()
        .into_iter()
        .find(|p| p.pid != exclude && matches(&p.name))
}

/// Whether a process with this PID currently exists.
///
/// A process owned by another user still counts as existing.
pub fn is_alive(pid: u32) -> bool {
    let Ok(pid) = pid_of(pid) else {
        return false;
    };
    matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM))
}

fn pid_of(pid: u32) -> nix::Result<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .map(Pid::from_raw)
        .ok_or(Errno::ESRCH)
}

/// Send SIGTERM to a process.
pub fn terminate(pid: u32) -> nix::Result<()> {
    kill(pid_of(pid)?, Signal::SIGTERM)
}

/// Send SIGKILL to a process.
pub fn force_kill(pid: u32) -> nix::Result<()> {
    kill(pid_of(pid)?, Signal::SIGKILL)
}

/// Send SIGTERM to every member of the process group led by `pgid`.
pub fn terminate_group(pgid: u32) -> nix::Result<()> {
    killpg(pid_of(pgid)?, Signal::SIGTERM)
}

/// SIGTERM every live PID, then SIGKILL whatever survives `grace`.
///
/// Returns how many processes were signalled.
pub async fn terminate_all(pids: &[u32], grace: Duration) -> usize {
    let mut signalled = Vec::new();
    for &pid in pids {
        if !is_alive(pid) {
            continue;
        }
        match terminate(pid) {
            Ok(()) => {
                debug!("Sent SIGTERM to {}", pid);
                signalled.push(pid);
            }
            Err(e) => warn!("Failed to signal PID {}: {}", pid, e),
        }
    }

    let deadline = tokio::time::Instant::now() + grace;
    while signalled.iter().any(|pid| is_alive(*pid)) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(EXIT_POLL).await;
    }

    for &pid in &signalled {
        if !is_alive(pid) {
            continue;
        }
        warn!("PID {} survived SIGTERM, sending SIGKILL", pid);
        if let Err(e) = force_kill(pid) {
            warn!("Failed to kill PID {}: {}", pid, e);
        }
    }

    signalled.len()
}
