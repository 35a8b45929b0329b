//! System uptime from `/proc/uptime`.

use std::time::Duration;

use crate::probe::ProbeError;

const PROC_UPTIME: &str = "/proc/uptime";

pub fn parse_uptime(content: &str) -> Result<Duration, ProbeError> {
    let first = content.split_whitespace().next().unwrap_or_default();
    let secs: f64 = first.parse().map_err(|_| ProbeError::Parse {
        what: "/proc/uptime",
        detail: content.trim().to_string(),
    })?;
    Duration::try_from_secs_f64(secs).map_err(|e| ProbeError::Parse {
        what: "/proc/uptime",
        detail: e.to_string(),
    })
}

pub fn read_uptime() -> Result<Duration, ProbeError> {
    let content = std::fs::read_to_string(PROC_UPTIME).map_err(|source| ProbeError::Io {
        what: PROC_UPTIME.to_string(),
        source,
    })?;
    parse_uptime(&content)
}
