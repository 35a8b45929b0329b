//! Decision engine.
//!
//! Turns one cycle's worth of signals into a [`Decision`]:
//! - inside the boot grace period nothing is checked
//! - with a display session, idle input plus a quiet system triggers the
//!   configured GUI action
//! - without one, an idle TTY plus a quiet system triggers the headless action
//!
//! Ambiguous or failed signals never lead to an action.

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::domain::ActionKind;
use crate::domain::CycleState;
use crate::domain::Decision;
use crate::domain::Sample;
use crate::probe::ProbeError;

/// Everything the engine may ask about the machine during one cycle.
#[async_trait]
pub trait ActivitySignals: Send {
    /// Time since boot.
    async fn uptime(&mut self) -> Result<Duration, ProbeError>;

    /// Whether an interactive display session is present.
    async fn has_display_session(&mut self) -> bool;

    /// Whether an allow-listed long-running app is running.
    async fn long_running_app(&mut self) -> Sample;

    /// Time since the last input at the display server.
    async fn display_idle(&mut self) -> Result<Duration, ProbeError>;

    /// Whether a user touched the terminal within the inactivity timeout.
    async fn tty_activity(&mut self) -> Sample;

    async fn cpu(&mut self) -> Sample;

    async fn io(&mut self) -> Sample;

    async fn net(&mut self) -> Sample;
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: CycleState,
    pub decision: Decision,
}

impl Evaluation {
    fn no_action(state: CycleState) -> Self {
        Self {
            state,
            decision: Decision::NoAction,
        }
    }
}

/// Thresholds and timeouts the engine decides with.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    inactivity_timeout: Duration,
    long_running_timeout: Duration,
    boot_grace_minutes: u64,
    action: ActionKind,
}

impl DecisionEngine {
    pub fn from_config(config: &Config) -> Self {
        Self {
            inactivity_timeout: config.inactivity_timeout(),
            long_running_timeout: config.long_running_apps_timeout(),
            boot_grace_minutes: config.boot_grace_minutes,
            action: config.action,
        }
    }

    /// Idle time required before acting.
    pub fn effective_timeout(&self, long_running_app: bool) -> Duration {
        if long_running_app {
            self.long_running_timeout
        } else {
            self.inactivity_timeout
        }
    }

    /// Whether `uptime` (in whole minutes) is still inside the grace period.
    pub fn in_boot_grace(&self, uptime: Duration) -> bool {
        uptime.as_secs() / 60 < self.boot_grace_minutes
    }

    /// Run one cycle of the state machine.
    pub async fn evaluate(&self, signals: &mut dyn ActivitySignals) -> Evaluation {
        let uptime = match signals.uptime().await {
            Ok(uptime) => uptime,
            Err(e) => {
                warn!("Cannot read uptime, skipping this cycle: {}", e);
                return Evaluation::no_action(CycleState::Booting);
            }
        };

        let minutes = uptime.as_secs() / 60;
        if self.in_boot_grace(uptime) {
            info!(
                "System is in boot grace period ({} minutes < {} minutes), skipping checks",
                minutes, self.boot_grace_minutes
            );
            return Evaluation::no_action(CycleState::Booting);
        }
        info!(
            "Boot grace period has passed ({} minutes >= {} minutes)",
            minutes, self.boot_grace_minutes
        );

        if signals.has_display_session().await {
            self.evaluate_gui(signals).await
        } else {
            self.evaluate_headless(signals).await
        }
    }

    async fn evaluate_gui(&self, signals: &mut dyn ActivitySignals) -> Evaluation {
        info!("Display session present, using display idle time");

        let long_running = signals.long_running_app().await;
        let timeout = self.effective_timeout(long_running.active);
        if long_running.active {
            info!(
                "Long-running app active ({}), using extended timeout: {}s",
                long_running.detail,
                timeout.as_secs()
            );
        } else {
            info!("No long-running apps active, using standard timeout: {}s", timeout.as_secs());
        }

        let idle = match signals.display_idle().await {
            Ok(idle) => idle,
            Err(e) => {
                warn!("Display idle query failed, assuming user present: {}", e);
                return Evaluation::no_action(CycleState::GuiActive);
            }
        };
        info!(
            "User idle time: {}s (timeout: {}s)",
            idle.as_secs(),
            timeout.as_secs()
        );

        if idle < timeout {
            info!("User activity detected (screen active), skipping system activity check");
            return Evaluation::no_action(CycleState::GuiActive);
        }

        if system_busy(signals).await {
            info!("System activity detected despite user inactivity, continuing to monitor");
            return Evaluation::no_action(CycleState::GuiActive);
        }

        info!("Inactivity timeout reached and no system activity detected");
        Evaluation {
            state: CycleState::GuiIdleCheck,
            decision: Decision::PerformGuiAction(self.action),
        }
    }

    async fn evaluate_headless(&self, signals: &mut dyn ActivitySignals) -> Evaluation {
        info!("No display session, using TTY activity");

        if signals.tty_activity().await.active {
            info!("User activity detected in headless session");
            return Evaluation::no_action(CycleState::HeadlessActive);
        }

        if system_busy(signals).await {
            info!("System activity detected in headless session, continuing to monitor");
            return Evaluation::no_action(CycleState::HeadlessActive);
        }

        info!("No user or system activity in headless session");
        Evaluation {
            state: CycleState::HeadlessIdleCheck,
            decision: Decision::PerformHeadlessAction,
        }
    }
}

/// OR of CPU, I/O and network activity, stopping at the first busy signal.
pub async fn system_busy(signals: &mut dyn ActivitySignals) -> bool {
    info!("Checking system activity");
    let busy = signals.cpu().await.active || signals.io().await.active || signals.net().await.active;
    if busy {
        info!("System activity detected");
    } else {
        info!("No significant system activity detected");
    }
    busy
}
