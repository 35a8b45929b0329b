//! Network throughput sampler over `/proc/net/dev`.

use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::domain::Sample;
use crate::probe::ProbeError;

const PROC_NET_DEV: &str = "/proc/net/dev";

/// Sum of received and transmitted bytes over every non-loopback interface.
pub fn parse_net_dev(content: &str) -> Result<u64, ProbeError> {
    let mut total: u64 = 0;

    for line in content.lines() {
        // Counters can run into the colon: "eth0:123456 ..."
        let Some((iface, counters)) = line.split_once(':') else {
            continue;
        };
        let iface = iface.trim();
        if iface.is_empty() || iface == "lo" || iface.contains(' ') {
            continue;
        }

        let fields: Vec<&str> = counters.split_whitespace().collect();
        if fields.len() < 9 {
            return Err(ProbeError::Parse {
                what: "/proc/net/dev",
                detail: format!("too few fields for {iface}"),
            });
        }

        let parse = |s: &str| {
            s.parse::<u64>().map_err(|e| ProbeError::Parse {
                what: "/proc/net/dev",
                detail: format!("{iface}: {e}"),
            })
        };
        let rx = parse(fields[0])?;
        let tx = parse(fields[8])?;
        total = total.saturating_add(rx).saturating_add(tx);
    }

    Ok(total)
}

/// Throughput in KB/s between two counter readings, never negative.
#[allow(clippy::cast_precision_loss)]
pub fn kbps(before: u64, after: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64().max(f64::EPSILON);
    after.saturating_sub(before) as f64 / (secs * 1024.0)
}

fn read_bytes() -> Result<u64, ProbeError> {
    let content = std::fs::read_to_string(PROC_NET_DEV).map_err(|source| ProbeError::Io {
        what: PROC_NET_DEV.to_string(),
        source,
    })?;
    parse_net_dev(&content)
}

/// Sample network throughput across `window`.
#[allow(clippy::cast_precision_loss)]
pub async fn sample(threshold_kbps: u64, window: Duration) -> Sample {
    info!("Checking network activity");

    let before = match read_bytes() {
        Ok(b) => b,
        Err(e) => {
            warn!("Network probe failed: {}", e);
            return Sample::no_evidence(e);
        }
    };
    tokio::time::sleep(window).await;
    let after = match read_bytes() {
        Ok(b) => b,
        Err(e) => {
            warn!("Network probe failed: {}", e);
            return Sample::no_evidence(e);
        }
    };

    let rate = kbps(before, after, window);
    let sample = Sample::from_threshold(rate, threshold_kbps as f64, format!("{rate:.1} KB/s"));
    if sample.active {
        info!(
            "High network activity detected: {} (threshold: {} KB/s)",
            sample.detail, threshold_kbps
        );
    } else {
        info!(
            "Network activity below threshold: {} (threshold: {} KB/s)",
            sample.detail, threshold_kbps
        );
    }
    sample
}
