//! TTY activity sampler for sessions without a display server.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use tracing::debug;
use tracing::info;

use crate::domain::Sample;

/// Terminal device attached to stdin, if any.
pub fn controlling_tty() -> Option<PathBuf> {
    let target = std::fs::read_link("/proc/self/fd/0").ok()?;
    let s = target.to_str()?;
    if s.starts_with("/dev/pts/") || s.starts_with("/dev/tty") {
        Some(target)
    } else {
        None
    }
}

/// Time since the terminal was last written to.
///
/// Without a readable terminal nobody has typed since boot, so the gap is the
/// system uptime.
pub fn idle_gap(tty_modified: Option<SystemTime>, now: SystemTime, uptime: Duration) -> Duration {
    match tty_modified {
        Some(modified) => now.duration_since(modified).unwrap_or(Duration::ZERO),
        None => uptime,
    }
}

fn modified(tty: &Path) -> Option<SystemTime> {
    std::fs::metadata(tty).and_then(|m| m.modified()).ok()
}

/// Whether a user touched the terminal within `timeout`.
pub fn sample(timeout: Duration, uptime: Duration) -> Sample {
    let tty = controlling_tty();
    let tty_modified = tty.as_deref().and_then(modified);
    debug!("Controlling terminal: {:?}", tty);

    from_gap(idle_gap(tty_modified, SystemTime::now(), uptime), timeout)
}

/// Active while the idle gap is still shorter than `timeout`.
pub fn from_gap(gap: Duration, timeout: Duration) -> Sample {
    let detail = format!("{}s since last TTY activity", gap.as_secs());

    if gap < timeout {
        info!("User activity detected based on TTY interaction ({})", detail);
        Sample::active(detail)
    } else {
        info!("No user activity detected ({})", detail);
        Sample::inactive(detail)
    }
}
