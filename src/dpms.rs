//! Display power management at startup, driven through `xset`.

use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::config::DpmsConfig;
use crate::probe::ChildTracker;
use crate::probe::ProbeError;
use crate::probe::run_bounded;

const XSET_TIMEOUT: Duration = Duration::from_secs(5);

/// DPMS section of `xset q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DpmsState {
    pub enabled: bool,
    pub standby_seconds: i64,
    pub suspend_seconds: i64,
    pub off_seconds: i64,
}

/// Extract the DPMS timers and switch from `xset q` output.
///
/// Returns `None` when the server reports no DPMS section.
pub fn parse_xset_query(output: &str) -> Option<DpmsState> {
    let mut lines = output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("DPMS"));
    lines.next()?;

    let mut timers: Option<(i64, i64, i64)> = None;
    let mut enabled = None;
    for line in lines {
        let line = line.trim();
        if line.starts_with("Standby:") {
            let values: Vec<i64> = line
                .split_whitespace()
                .filter_map(|word| word.parse().ok())
                .collect();
            if let [standby, suspend, off] = values[..] {
                timers = Some((standby, suspend, off));
            }
        } else if line.starts_with("DPMS is") {
            enabled = Some(line.ends_with("Enabled"));
        }
    }

    let (standby_seconds, suspend_seconds, off_seconds) = timers?;
    Some(DpmsState {
        enabled: enabled.unwrap_or(false),
        standby_seconds,
        suspend_seconds,
        off_seconds,
    })
}

/// `xset` argument lists that apply `config`.
pub fn xset_commands(config: &DpmsConfig) -> Vec<Vec<String>> {
    if !config.enabled {
        return vec![vec!["-dpms".to_string()]];
    }
    vec![
        vec!["+dpms".to_string()],
        vec![
            "dpms".to_string(),
            config.standby_seconds.to_string(),
            config.suspend_seconds.to_string(),
            config.off_seconds.to_string(),
        ],
    ]
}

/// Current DPMS state of the display server.
pub async fn query(tracker: &ChildTracker) -> Result<Option<DpmsState>, ProbeError> {
    let output = run_bounded(tracker, "xset", &["q"], XSET_TIMEOUT).await?;
    Ok(parse_xset_query(&String::from_utf8_lossy(&output.stdout)))
}

/// Log the current state, then apply `config`. Failures are logged only.
pub async fn configure(tracker: &ChildTracker, config: &DpmsConfig) {
    match query(tracker).await {
        Ok(Some(state)) => info!(
            "Current DPMS: enabled={} standby={}s suspend={}s off={}s",
            state.enabled, state.standby_seconds, state.suspend_seconds, state.off_seconds
        ),
        Ok(None) => info!("Display server reports no DPMS support"),
        Err(e) => warn!("Failed to query DPMS: {}", e),
    }

    for args in xset_commands(config) {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match run_bounded(tracker, "xset", &args, XSET_TIMEOUT).await {
            Ok(_) => info!("Applied DPMS setting: xset {}", args.join(" ")),
            Err(e) => warn!("Failed to apply DPMS setting (xset {}): {}", args.join(" "), e),
        }
    }
}
