//! CPU busy-delta sampler over `/proc/stat`.

use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::domain::Sample;
use crate::probe::ProbeError;

const PROC_STAT: &str = "/proc/stat";

/// Aggregate CPU time counters, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// user + nice + system + idle + iowait + irq + softirq.
    pub total: u64,
    pub idle: u64,
}

/// Parse the aggregate `cpu ` line.
pub fn parse_proc_stat(content: &str) -> Result<CpuTimes, ProbeError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| ProbeError::Parse {
            what: "/proc/stat",
            detail: "no aggregate cpu line".to_string(),
        })?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(7)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| ProbeError::Parse {
            what: "/proc/stat",
            detail: format!("{e}: {line}"),
        })?;

    if fields.len() < 4 {
        return Err(ProbeError::Parse {
            what: "/proc/stat",
            detail: format!("too few fields: {line}"),
        });
    }

    Ok(CpuTimes {
        total: fields.iter().sum(),
        idle: fields[3],
    })
}

/// Non-idle share of the elapsed ticks, in percent, never negative.
#[allow(clippy::cast_precision_loss)]
pub fn usage_percent(before: CpuTimes, after: CpuTimes) -> f64 {
    let total = match after.total.saturating_sub(before.total) {
        0 => 1,
        n => n,
    };
    let idle = after.idle.saturating_sub(before.idle);
    let busy = total.saturating_sub(idle);
    100.0 * busy as f64 / total as f64
}

fn read_times() -> Result<CpuTimes, ProbeError> {
    let content = std::fs::read_to_string(PROC_STAT).map_err(|source| ProbeError::Io {
        what: PROC_STAT.to_string(),
        source,
    })?;
    parse_proc_stat(&content)
}

/// Sample CPU usage across `window` and compare against `threshold_percent`.
#[allow(clippy::cast_precision_loss)]
pub async fn sample(threshold_percent: u64, window: Duration) -> Sample {
    info!("Checking CPU activity");

    let before = match read_times() {
        Ok(t) => t,
        Err(e) => {
            warn!("CPU probe failed: {}", e);
            return Sample::no_evidence(e);
        }
    };
    tokio::time::sleep(window).await;
    let after = match read_times() {
        Ok(t) => t,
        Err(e) => {
            warn!("CPU probe failed: {}", e);
            return Sample::no_evidence(e);
        }
    };

    let usage = usage_percent(before, after);
    let sample = Sample::from_threshold(usage, threshold_percent as f64, format!("{usage:.2}%"));
    if sample.active {
        info!(
            "High CPU activity detected: {} (threshold: {}%)",
            sample.detail, threshold_percent
        );
    } else {
        info!(
            "CPU activity below threshold: {} (threshold: {}%)",
            sample.detail, threshold_percent
        );
    }
    sample
}
