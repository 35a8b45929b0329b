//! Long-running application scan.

use regex::Regex;
use tracing::debug;
use tracing::info;

use crate::domain::Sample;
use crate::process;
use crate::process::ProcessEntry;

/// First process (other than `own_pid`) whose name matches the allow-list.
pub fn find_long_running<'a>(
    pattern: &Regex,
    processes: &'a [ProcessEntry],
    own_pid: u32,
) -> Option<&'a ProcessEntry> {
    processes
        .iter()
        .find(|p| p.pid != own_pid && pattern.is_match(&p.name))
}

/// Scan the process table for a long-running app.
pub fn sample(pattern: &Regex, own_pid: u32) -> Sample {
    let processes = process::list_processes();
    debug!("Scanned {} processes for long-running apps", processes.len());

    match find_long_running(pattern, &processes, own_pid) {
        Some(p) => {
            info!("Long-running app active: {} (PID {})", p.name, p.pid);
            Sample::active(format!("{} ({})", p.name, p.pid))
        }
        None => Sample::inactive("none"),
    }
}
