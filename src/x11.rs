//! X11 display server access through `xset` and `xprintidle`.
//!
//! Both tools run as bounded helpers, so a frozen server costs one killed
//! child per query and never a stuck thread.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::environment::DISPLAY_SERVER_PROCESS;
use crate::environment::DisplayServer;
use crate::environment::PROBE_TIMEOUT;
use crate::probe::ChildTracker;
use crate::probe::ProbeError;
use crate::probe::run_bounded;
use crate::process;

/// The local X server, reached through `$DISPLAY`.
#[derive(Debug, Clone, Default)]
pub struct X11Server {
    tracker: ChildTracker,
}

impl X11Server {
    pub fn new(tracker: ChildTracker) -> Self {
        Self { tracker }
    }

    /// Time since the last keyboard or pointer input on `$DISPLAY`.
    pub async fn idle_time(&self) -> Result<Duration, ProbeError> {
        let output = run_bounded(&self.tracker, "xprintidle", &[], PROBE_TIMEOUT).await?;
        parse_idle_ms(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl DisplayServer for X11Server {
    async fn probe(&self, display_name: &str) -> Result<(), ProbeError> {
        run_bounded(
            &self.tracker,
            "xset",
            &["-display", display_name, "q"],
            PROBE_TIMEOUT,
        )
        .await?;
        trace!("X server on {} answered", display_name);
        Ok(())
    }

    async fn server_process_running(&self) -> Result<bool, ProbeError> {
        let own = std::process::id();
        Ok(process::find_process(own, |name| name == DISPLAY_SERVER_PROCESS).is_some())
    }
}

/// Parse the millisecond count printed by `xprintidle`.
pub fn parse_idle_ms(output: &str) -> Result<Duration, ProbeError> {
    output
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ProbeError::Parse {
            what: "xprintidle",
            detail: output.trim().to_string(),
        })
}
