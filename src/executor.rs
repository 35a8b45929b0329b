//! Action executor.
//!
//! Runs the configured shell command for a decision through `sh -c`, so a
//! command may chain several steps (`sync; pm-suspend`).

use std::process::Stdio;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::domain::ActionKind;
use crate::domain::Decision;
use crate::probe::ChildTracker;
use crate::process;

/// What happened when a decision was handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The decision did not call for an action.
    Skipped,
    /// Dry-run mode: the command was only logged.
    DryRun { command: String },
    /// The configured command is empty.
    NoCommand,
    /// The command ran to completion.
    Completed { code: Option<i32> },
    /// Shutdown was requested while the command ran; its process group was stopped.
    Interrupted,
}

/// Human label and command string for an actionable decision.
pub fn command_for(config: &Config, decision: Decision) -> Option<(&'static str, &str)> {
    match decision {
        Decision::NoAction => None,
        Decision::PerformGuiAction(ActionKind::Sleep) => {
            Some(("GUI Sleep", config.gui_command(ActionKind::Sleep)))
        }
        Decision::PerformGuiAction(ActionKind::Shutdown) => {
            Some(("GUI Shutdown", config.gui_command(ActionKind::Shutdown)))
        }
        Decision::PerformHeadlessAction => Some(("No-GUI", config.headless_command.as_str())),
    }
}

pub struct ActionExecutor {
    config: Arc<Config>,
    tracker: ChildTracker,
    dry_run: bool,
}

impl ActionExecutor {
    pub fn new(config: Arc<Config>, tracker: ChildTracker, dry_run: bool) -> Self {
        Self {
            config,
            tracker,
            dry_run,
        }
    }

    /// Run the command for `decision` and wait for it, or until `shutdown`.
    ///
    /// No retry: a failed command is reported and the next cycle decides again.
    pub async fn execute(
        &self,
        decision: Decision,
        shutdown: &CancellationToken,
    ) -> Result<ActionOutcome> {
        let Some((label, command)) = command_for(&self.config, decision) else {
            return Ok(ActionOutcome::Skipped);
        };

        if command.trim().is_empty() {
            warn!("No {} command configured, nothing to do", label);
            return Ok(ActionOutcome::NoCommand);
        }

        if self.dry_run {
            info!("[DRY RUN] Would execute {} Command: {}", label, command);
            return Ok(ActionOutcome::DryRun {
                command: command.to_string(),
            });
        }

        info!("Executing {} Command: {}", label, command);

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {label} command"))?;

        let pid = child.id();
        if let Some(pid) = pid {
            self.tracker.record(pid);
        }

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.with_context(|| format!("Failed to wait for {label} command"))?
            }
            () = shutdown.cancelled() => {
                warn!("Shutdown requested, stopping {} command", label);
                if let Some(pid) = pid
                    && let Err(e) = process::terminate_group(pid)
                {
                    warn!("Failed to signal {} command group: {}", label, e);
                }
                return Ok(ActionOutcome::Interrupted);
            }
        };

        if output.status.success() {
            info!("{} command finished", label);
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                "{} command failed (exit code {:?}): {}",
                label,
                output.status.code(),
                stderr.trim()
            );
        }

        Ok(ActionOutcome::Completed {
            code: output.status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use std::time::Instant;

    use super::*;
    use crate::registry::ProcessRegistry;

    struct Harness {
        executor: ActionExecutor,
        registry: ProcessRegistry,
        _dir: tempfile::TempDir,
    }

    fn harness(config: Config, dry_run: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let registry = ProcessRegistry::new(dir.path().join("pids"));
        let tracker = ChildTracker::with_registry(registry.clone());
        Harness {
            executor: ActionExecutor::new(Arc::new(config), tracker, dry_run),
            registry,
            _dir: dir,
        }
    }

    #[test]
    fn test_command_for_each_decision() {
        let config = Config {
            sleep_command: "s".to_string(),
            shutdown_command: "d".to_string(),
            headless_command: "h".to_string(),
            ..Default::default()
        };
        assert_eq!(command_for(&config, Decision::NoAction), None);
        assert_eq!(
            command_for(&config, Decision::PerformGuiAction(ActionKind::Sleep)),
            Some(("GUI Sleep", "s"))
        );
        assert_eq!(
            command_for(&config, Decision::PerformGuiAction(ActionKind::Shutdown)),
            Some(("GUI Shutdown", "d"))
        );
        assert_eq!(
            command_for(&config, Decision::PerformHeadlessAction),
            Some(("No-GUI", "h"))
        );
    }

    #[tokio::test]
    async fn test_no_action_is_skipped() {
        let h = harness(Config::default(), false);
        let outcome = h
            .executor
            .execute(Decision::NoAction, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_empty_command_is_noop() {
        let config = Config {
            headless_command: String::new(),
            ..Default::default()
        };
        let h = harness(config, false);
        let outcome = h
            .executor
            .execute(Decision::PerformHeadlessAction, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::NoCommand);
        assert!(h.registry.pids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_spawn() {
        let h = harness(Config::default(), true);
        let outcome = h
            .executor
            .execute(
                Decision::PerformGuiAction(ActionKind::Shutdown),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ActionOutcome::DryRun {
                command: "sync; shutdown -h now".to_string()
            }
        );
        assert!(h.registry.pids().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_runs_multi_step_command() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let config = Config {
            sleep_command: format!("true; touch '{}'", marker.display()),
            ..Default::default()
        };
        let h = harness(config, false);

        let outcome = h
            .executor
            .execute(
                Decision::PerformGuiAction(ActionKind::Sleep),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::Completed { code: Some(0) });
        assert!(marker.exists());
        assert_eq!(h.registry.pids().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_command_reports_code() {
        let config = Config {
            headless_command: "exit 3".to_string(),
            ..Default::default()
        };
        let h = harness(config, false);
        let outcome = h
            .executor
            .execute(Decision::PerformHeadlessAction, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Completed { code: Some(3) });
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_command() {
        let config = Config {
            headless_command: "sleep 30; true".to_string(),
            ..Default::default()
        };
        let h = harness(config, false);
        let shutdown = CancellationToken::new();
        let canceller = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = h
            .executor
            .execute(Decision::PerformHeadlessAction, &shutdown)
            .await
            .unwrap();

        assert_eq!(outcome, ActionOutcome::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
        // The shell was on file while it ran
        assert_eq!(h.registry.pids().unwrap().len(), 1);
    }
}
