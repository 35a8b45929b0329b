//! Disk I/O sampler built on `iostat`.

use std::time::Duration;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::domain::Sample;
use crate::probe::ChildTracker;
use crate::probe::run_bounded;

/// Hard limit for an iostat run sampling over `window`.
pub fn iostat_timeout(window: Duration) -> Duration {
    window
        .saturating_mul(2)
        .saturating_add(Duration::from_secs(1))
}

/// Sum of per-device `kB_read/s` and `kB_wrtn/s` from `iostat -d -k` output.
///
/// Device rows start with a lowercase letter; headers and the banner do not.
pub fn parse_iostat(output: &str) -> f64 {
    output
        .lines()
        .filter(|line| line.starts_with(|c: char| c.is_ascii_lowercase()))
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let column = |i: usize| {
                fields
                    .get(i)
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0)
            };
            column(2) + column(3)
        })
        .sum()
}

/// Run iostat for one `window` and compare against `threshold_kbps`.
///
/// Timeout or failure reports inactive.
#[allow(clippy::cast_precision_loss)]
pub async fn sample(tracker: &ChildTracker, threshold_kbps: u64, window: Duration) -> Sample {
    info!("Checking I/O activity");

    let secs = window.as_secs().max(1).to_string();
    let timeout = iostat_timeout(window);
    let output = match run_bounded(tracker, "iostat", &["-d", "-k", "-y", &secs, "1"], timeout)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            warn!("iostat probe failed: {}", e);
            return Sample::no_evidence(e);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    debug!("iostat output: {}", stdout.trim());

    let total = parse_iostat(&stdout);
    let sample = Sample::from_threshold(total, threshold_kbps as f64, format!("{total:.1} KB/s"));
    if sample.active {
        info!(
            "High I/O activity detected: {} (threshold: {} KB/s)",
            sample.detail, threshold_kbps
        );
    } else {
        info!(
            "I/O activity below threshold: {} (threshold: {} KB/s)",
            sample.detail, threshold_kbps
        );
    }
    sample
}
