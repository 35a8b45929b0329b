//! Domain types shared by the samplers, the decision engine and the executor.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Power action performed on an idle machine with a display session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    #[value(alias = "0")]
    Sleep,
    #[value(alias = "1")]
    Shutdown,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sleep => "sleep",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single activity probe.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Whether the probe saw activity.
    pub active: bool,

    /// Human-readable magnitude for the log (e.g. "12.50%", "300.0 KB/s").
    pub detail: String,
}

impl Sample {
    pub fn active(detail: impl Into<String>) -> Self {
        Self {
            active: true,
            detail: detail.into(),
        }
    }

    pub fn inactive(detail: impl Into<String>) -> Self {
        Self {
            active: false,
            detail: detail.into(),
        }
    }

    /// Sample for a probe that failed. Absence of evidence is not activity.
    pub fn no_evidence(reason: impl fmt::Display) -> Self {
        Self::inactive(format!("no evidence ({reason})"))
    }

    /// Compare a measurement against its threshold. Equality is inactive.
    pub fn from_threshold(value: f64, threshold: f64, detail: impl Into<String>) -> Self {
        if value > threshold {
            Self::active(detail)
        } else {
            Self::inactive(detail)
        }
    }
}

/// What the daemon should do at the end of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    NoAction,
    PerformGuiAction(ActionKind),
    PerformHeadlessAction,
}

impl Decision {
    pub fn is_action(self) -> bool {
        !matches!(self, Self::NoAction)
    }
}

/// Where a cycle ended up in the decision state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Inside the boot grace period; nothing was checked.
    Booting,
    /// Display session present and the user looked idle.
    GuiIdleCheck,
    /// Display session present and the user or the system is active.
    GuiActive,
    /// No display session and no TTY interaction.
    HeadlessIdleCheck,
    /// No display session and the user or the system is active.
    HeadlessActive,
    /// An action was decided. Fire-and-forget, never persisted.
    ActionTaken,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Booting => "booting",
            Self::GuiIdleCheck => "gui-idle-check",
            Self::GuiActive => "gui-active",
            Self::HeadlessIdleCheck => "headless-idle-check",
            Self::HeadlessActive => "headless-active",
            Self::ActionTaken => "action-taken",
        };
        f.write_str(name)
    }
}
