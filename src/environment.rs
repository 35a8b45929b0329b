//! Display session detection.
//!
//! Decides once per cycle whether an interactive X session is present, which
//! picks the GUI or the headless branch of the decision engine.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use crate::probe::ProbeError;

/// Bound for the display probe and the process scan.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Process name that marks a running X server.
pub const DISPLAY_SERVER_PROCESS: &str = "Xorg";

/// Checks against a display server.
#[async_trait]
pub trait DisplayServer: Send + Sync {
    /// Confirm the server behind `display_name` answers.
    async fn probe(&self, display_name: &str) -> Result<(), ProbeError>;

    /// Whether a display server process is running.
    async fn server_process_running(&self) -> Result<bool, ProbeError>;
}

/// Session-related environment variables, captured once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    /// `XDG_SESSION_TYPE`.
    pub session_type: Option<String>,

    /// `DISPLAY`.
    pub display: Option<String>,
}

impl SessionEnv {
    pub fn from_env() -> Self {
        Self {
            session_type: non_empty_var("XDG_SESSION_TYPE"),
            display: non_empty_var("DISPLAY"),
        }
    }

    /// Get diagnostic information about the session environment.
    pub fn diagnostics(&self) -> Vec<String> {
        let show = |name: &str, value: &Option<String>| match value {
            Some(v) => format!("{name}={v}"),
            None => format!("{name}: NOT SET"),
        };
        vec![
            show("XDG_SESSION_TYPE", &self.session_type),
            show("DISPLAY", &self.display),
        ]
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Whether an interactive display session is present.
///
/// First match wins: an x11 session type, then a probe of `DISPLAY` (whose
/// failure means no session), then a scan for a display server process.
pub async fn has_display_session(env: &SessionEnv, server: &dyn DisplayServer) -> bool {
    if env.session_type.as_deref() == Some("x11") {
        info!("Display session detected via XDG_SESSION_TYPE=x11");
        return true;
    }

    if let Some(ref display_name) = env.display {
        return match tokio::time::timeout(PROBE_TIMEOUT, server.probe(display_name)).await {
            Ok(Ok(())) => {
                info!("X server is active (DISPLAY={})", display_name);
                true
            }
            Ok(Err(e)) => {
                info!("X server DISPLAY={} set but unresponsive: {}", display_name, e);
                false
            }
            Err(_) => {
                warn!("X server probe on DISPLAY={} timed out", display_name);
                false
            }
        };
    }

    match tokio::time::timeout(PROBE_TIMEOUT, server.server_process_running()).await {
        Ok(Ok(true)) => {
            info!("{} process detected", DISPLAY_SERVER_PROCESS);
            true
        }
        Ok(Ok(false)) => {
            info!("No active X server found");
            false
        }
        Ok(Err(e)) => {
            warn!("Display server process scan failed: {}", e);
            false
        }
        Err(_) => {
            warn!("Display server process scan timed out");
            false
        }
    }
}
