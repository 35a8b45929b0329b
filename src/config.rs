//! Configuration loading, overrides and validation for idlewarden.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::domain::ActionKind;

/// Directory under the user's home holding config, PID registry and log.
pub const STATE_DIR_NAME: &str = ".idlewarden";

pub const DEFAULT_LONG_RUNNING_APPS: &str = "smplayer|mplayer|vlc";
pub const DEFAULT_SLEEP_COMMAND: &str = "sync; pm-suspend";
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "sync; shutdown -h now";
pub const DEFAULT_HEADLESS_COMMAND: &str = "sync; shutdown -h now";

/// One year, in minutes.
const MAX_BOOT_GRACE_MINUTES: u64 = 525_600;

/// Longest CPU, network or I/O sampling window.
pub const MAX_SAMPLE_WINDOW_SECONDS: u64 = 3600;

/// Characters that turn a command into a pipeline or a redirection.
const FORBIDDEN_COMMAND_CHARS: [char; 3] = ['|', '>', '<'];

/// Errors that reject a configuration record.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("{field} contains a pipe or redirection character: {command:?}")]
    UnsafeCommand {
        field: &'static str,
        command: String,
    },

    #[error("long_running_apps is not a valid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("DPMS timer {field} must be non-negative, got {value}")]
    InvalidDpms { field: &'static str, value: i64 },
}

/// Monitor power timers applied once at startup when a display is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DpmsConfig {
    pub enabled: bool,
    pub standby_seconds: i64,
    pub suspend_seconds: i64,
    pub off_seconds: i64,
}

impl Default for DpmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            standby_seconds: 600,
            suspend_seconds: 600,
            off_seconds: 600,
        }
    }
}

/// Immutable snapshot of every tunable for one daemon run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Home directory holding the state directory. Falls back to `$HOME`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,

    /// Display idle time before acting, in milliseconds (default: 1h).
    pub inactivity_timeout_ms: u64,

    /// Idle time used while a long-running app is present (default: 3h).
    pub long_running_apps_timeout_ms: u64,

    /// Regex alternation of process names, e.g. "mpv|vlc".
    pub long_running_apps: String,

    /// Seconds between check cycles (default: 3600).
    pub check_interval_seconds: u64,

    /// CPU usage percentage above which the system counts as busy.
    pub cpu_threshold_percent: u64,

    /// Summed disk read+write KB/s above which the system counts as busy.
    pub io_threshold_kbps: u64,

    /// Non-loopback rx+tx KB/s above which the system counts as busy.
    pub net_threshold_kbps: u64,

    /// Window for the CPU and network deltas, in seconds.
    pub cpu_net_window_seconds: u64,

    /// Duration of the iostat sample, in seconds.
    pub io_window_seconds: u64,

    /// Minutes after boot during which no action is taken.
    pub boot_grace_minutes: u64,

    /// Action taken when a display session is idle.
    pub action: ActionKind,

    /// Shell command for `ActionKind::Sleep` with a display session.
    pub sleep_command: String,

    /// Shell command for `ActionKind::Shutdown` with a display session.
    pub shutdown_command: String,

    /// Shell command used when no display session exists.
    pub headless_command: String,

    /// Optional DPMS timers, applied at startup only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpms: Option<DpmsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: None,
            inactivity_timeout_ms: 3_600_000,
            long_running_apps_timeout_ms: 10_800_000,
            long_running_apps: DEFAULT_LONG_RUNNING_APPS.to_string(),
            check_interval_seconds: 3600,
            cpu_threshold_percent: 50,
            io_threshold_kbps: 5000,
            net_threshold_kbps: 250,
            cpu_net_window_seconds: 5,
            io_window_seconds: 1,
            boot_grace_minutes: 20,
            action: ActionKind::Sleep,
            sleep_command: DEFAULT_SLEEP_COMMAND.to_string(),
            shutdown_command: DEFAULT_SHUTDOWN_COMMAND.to_string(),
            headless_command: DEFAULT_HEADLESS_COMMAND.to_string(),
            dpms: None,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// Empty string fields are replaced by their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config.fill_empty_strings())
    }

    /// Load from an explicit path, or from `default_path` if it exists, or defaults.
    pub fn load_or_default(path: Option<&Path>, default_path: &Path) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if default_path.exists() {
            return Self::load(default_path);
        }

        Ok(Self::default())
    }

    /// Write the record as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Render the record as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Replace empty string fields with their documented defaults.
    pub fn fill_empty_strings(mut self) -> Self {
        fn fill(value: &mut String, default: &str) {
            if value.trim().is_empty() {
                *value = default.to_string();
            }
        }

        fill(&mut self.long_running_apps, DEFAULT_LONG_RUNNING_APPS);
        fill(&mut self.sleep_command, DEFAULT_SLEEP_COMMAND);
        fill(&mut self.shutdown_command, DEFAULT_SHUTDOWN_COMMAND);
        fill(&mut self.headless_command, DEFAULT_HEADLESS_COMMAND);
        self
    }

    /// Check every invariant of the record.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("inactivity_timeout_ms", self.inactivity_timeout_ms, 1, u64::MAX)?;
        check_range(
            "long_running_apps_timeout_ms",
            self.long_running_apps_timeout_ms,
            1,
            u64::MAX,
        )?;
        check_range("check_interval_seconds", self.check_interval_seconds, 1, u64::MAX)?;
        check_range("cpu_threshold_percent", self.cpu_threshold_percent, 0, 100)?;
        check_range(
            "cpu_net_window_seconds",
            self.cpu_net_window_seconds,
            1,
            MAX_SAMPLE_WINDOW_SECONDS,
        )?;
        check_range(
            "io_window_seconds",
            self.io_window_seconds,
            1,
            MAX_SAMPLE_WINDOW_SECONDS,
        )?;
        check_range(
            "boot_grace_minutes",
            self.boot_grace_minutes,
            1,
            MAX_BOOT_GRACE_MINUTES,
        )?;

        check_command("sleep_command", &self.sleep_command)?;
        check_command("shutdown_command", &self.shutdown_command)?;
        check_command("headless_command", &self.headless_command)?;

        self.long_running_pattern()?;

        if let Some(ref dpms) = self.dpms {
            for (field, value) in [
                ("dpms.standby_seconds", dpms.standby_seconds),
                ("dpms.suspend_seconds", dpms.suspend_seconds),
                ("dpms.off_seconds", dpms.off_seconds),
            ] {
                if value < 0 {
                    return Err(ConfigError::InvalidDpms { field, value });
                }
            }
        }

        Ok(())
    }

    /// Compile the long-running app allow-list.
    pub fn long_running_pattern(&self) -> Result<Regex, ConfigError> {
        Ok(Regex::new(&format!("(?:{})", self.long_running_apps))?)
    }

    /// Command configured for a display-session action.
    pub fn gui_command(&self, action: ActionKind) -> &str {
        match action {
            ActionKind::Sleep => &self.sleep_command,
            ActionKind::Shutdown => &self.shutdown_command,
        }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_millis(self.inactivity_timeout_ms)
    }

    pub fn long_running_apps_timeout(&self) -> Duration {
        Duration::from_millis(self.long_running_apps_timeout_ms)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn cpu_net_window(&self) -> Duration {
        Duration::from_secs(self.cpu_net_window_seconds)
    }

    pub fn io_window(&self) -> Duration {
        Duration::from_secs(self.io_window_seconds)
    }

    pub fn boot_grace(&self) -> Duration {
        Duration::from_secs(self.boot_grace_minutes.saturating_mul(60))
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn check_command(field: &'static str, command: &str) -> Result<(), ConfigError> {
    if command.contains(FORBIDDEN_COMMAND_CHARS) {
        return Err(ConfigError::UnsafeCommand {
            field,
            command: command.to_string(),
        });
    }
    Ok(())
}

/// Launch-time overrides for individual configuration fields.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Home directory holding the .idlewarden state directory.
    #[arg(long)]
    pub home: Option<PathBuf>,

    /// Inactivity timeout in milliseconds.
    #[arg(long = "inactivity-timeout", value_name = "MS")]
    pub inactivity_timeout_ms: Option<u64>,

    /// Timeout in milliseconds while a long-running app is present.
    #[arg(long = "long-running-apps-timeout", value_name = "MS")]
    pub long_running_apps_timeout_ms: Option<u64>,

    /// Long-running app names as a regex alternation.
    #[arg(long = "custom-long-running-apps", value_name = "PATTERN")]
    pub long_running_apps: Option<String>,

    /// Seconds between check cycles.
    #[arg(long = "check-interval", value_name = "SECONDS")]
    pub check_interval_seconds: Option<u64>,

    /// CPU busy threshold in percent.
    #[arg(long = "cpu-threshold", value_name = "PERCENT")]
    pub cpu_threshold_percent: Option<u64>,

    /// Disk I/O busy threshold in KB/s.
    #[arg(long = "io-threshold", value_name = "KBPS")]
    pub io_threshold_kbps: Option<u64>,

    /// Network busy threshold in KB/s.
    #[arg(long = "net-threshold", value_name = "KBPS")]
    pub net_threshold_kbps: Option<u64>,

    /// CPU and network sampling window in seconds.
    #[arg(long = "cpu-net-check-interval", value_name = "SECONDS")]
    pub cpu_net_window_seconds: Option<u64>,

    /// Disk I/O sampling window in seconds.
    #[arg(long = "io-check-interval", value_name = "SECONDS")]
    pub io_window_seconds: Option<u64>,

    /// Boot grace period in minutes.
    #[arg(long = "boot-grace-period", alias = "boot_grace_period", value_name = "MINUTES")]
    pub boot_grace_minutes: Option<u64>,

    /// Action for an idle display session.
    #[arg(long = "action-type", value_enum)]
    pub action: Option<ActionKind>,

    /// Command run to sleep with a display session.
    #[arg(long = "sleep-command", value_name = "COMMAND")]
    pub sleep_command: Option<String>,

    /// Command run to shut down with a display session.
    #[arg(long = "shutdown-command", value_name = "COMMAND")]
    pub shutdown_command: Option<String>,

    /// Command run when no display session exists.
    #[arg(long = "custom-no-gui-command", alias = "headless-command", value_name = "COMMAND")]
    pub headless_command: Option<String>,
}

impl Overrides {
    /// Apply every override that was supplied.
    ///
    /// Empty command overrides are kept as-is: they disable the action.
    pub fn apply(self, mut config: Config) -> Config {
        if self.home.is_some() {
            config.home = self.home;
        }
        if let Some(v) = self.inactivity_timeout_ms {
            config.inactivity_timeout_ms = v;
        }
        if let Some(v) = self.long_running_apps_timeout_ms {
            config.long_running_apps_timeout_ms = v;
        }
        if let Some(v) = self.long_running_apps {
            config.long_running_apps = v;
        }
        if let Some(v) = self.check_interval_seconds {
            config.check_interval_seconds = v;
        }
        if let Some(v) = self.cpu_threshold_percent {
            config.cpu_threshold_percent = v;
        }
        if let Some(v) = self.io_threshold_kbps {
            config.io_threshold_kbps = v;
        }
        if let Some(v) = self.net_threshold_kbps {
            config.net_threshold_kbps = v;
        }
        if let Some(v) = self.cpu_net_window_seconds {
            config.cpu_net_window_seconds = v;
        }
        if let Some(v) = self.io_window_seconds {
            config.io_window_seconds = v;
        }
        if let Some(v) = self.boot_grace_minutes {
            config.boot_grace_minutes = v;
        }
        if let Some(v) = self.action {
            config.action = v;
        }
        if let Some(v) = self.sleep_command {
            config.sleep_command = v;
        }
        if let Some(v) = self.shutdown_command {
            config.shutdown_command = v;
        }
        if let Some(v) = self.headless_command {
            config.headless_command = v;
        }
        config
    }
}

/// Files the daemon keeps under `<home>/.idlewarden`.
#[derive(Debug, Clone)]
pub struct StatePaths {
    dir: PathBuf,
}

impl StatePaths {
    pub fn for_home(home: &Path) -> Self {
        Self {
            dir: home.join(STATE_DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join("idlewarden.pids")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("idlewarden.log")
    }

    /// Create the state directory if needed.
    pub fn ensure_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory: {}", self.dir.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.inactivity_timeout_ms, 3_600_000);
        assert_eq!(config.long_running_apps_timeout_ms, 10_800_000);
        assert_eq!(config.long_running_apps, "smplayer|mplayer|vlc");
        assert_eq!(config.check_interval_seconds, 3600);
        assert_eq!(config.cpu_threshold_percent, 50);
        assert_eq!(config.boot_grace_minutes, 20);
        assert_eq!(config.action, ActionKind::Sleep);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            inactivity_timeout_ms = 60000
            long_running_apps = "mpv|vlc"
            cpu_threshold_percent = 0
            action = "shutdown"
            headless_command = "systemctl poweroff"

            [dpms]
            enabled = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.inactivity_timeout_ms, 60000);
        assert_eq!(config.long_running_apps, "mpv|vlc");
        assert_eq!(config.cpu_threshold_percent, 0);
        assert_eq!(config.action, ActionKind::Shutdown);
        assert_eq!(config.headless_command, "systemctl poweroff");
        // Unset fields keep their defaults
        assert_eq!(config.check_interval_seconds, 3600);
        let dpms = config.dpms.unwrap();
        assert!(!dpms.enabled);
        assert_eq!(dpms.off_seconds, 600);
    }

    #[test]
    fn test_empty_strings_filled() {
        let config = Config {
            long_running_apps: String::new(),
            sleep_command: "  ".to_string(),
            shutdown_command: String::new(),
            headless_command: String::new(),
            ..Default::default()
        }
        .fill_empty_strings();

        assert_eq!(config.long_running_apps, DEFAULT_LONG_RUNNING_APPS);
        assert_eq!(config.sleep_command, DEFAULT_SLEEP_COMMAND);
        assert_eq!(config.shutdown_command, DEFAULT_SHUTDOWN_COMMAND);
        assert_eq!(config.headless_command, DEFAULT_HEADLESS_COMMAND);
    }

    #[test]
    fn test_thresholds_may_be_zero() {
        let config = Config {
            cpu_threshold_percent: 0,
            io_threshold_kbps: 0,
            net_threshold_kbps: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        for config in [
            Config {
                inactivity_timeout_ms: 0,
                ..Default::default()
            },
            Config {
                check_interval_seconds: 0,
                ..Default::default()
            },
            Config {
                io_window_seconds: 0,
                ..Default::default()
            },
            Config {
                boot_grace_minutes: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(ConfigError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_sample_windows_capped() {
        let huge = Config {
            io_window_seconds: u64::MAX / 2 + 1,
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(ConfigError::OutOfRange {
                field: "io_window_seconds",
                ..
            })
        ));

        let huge = Config {
            cpu_net_window_seconds: MAX_SAMPLE_WINDOW_SECONDS + 1,
            ..Default::default()
        };
        assert!(huge.validate().is_err());

        let longest = Config {
            io_window_seconds: MAX_SAMPLE_WINDOW_SECONDS,
            cpu_net_window_seconds: MAX_SAMPLE_WINDOW_SECONDS,
            ..Default::default()
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn test_cpu_threshold_capped() {
        let config = Config {
            cpu_threshold_percent: 101,
            ..Default::default()
        };
        match config.validate() {
            Err(ConfigError::OutOfRange { field, .. }) => {
                assert_eq!(field, "cpu_threshold_percent");
            }
            other => panic!("Expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_unsafe_commands_rejected() {
        for command in ["sync | tee x", "echo hi > /etc/passwd", "sh < script"] {
            let config = Config {
                headless_command: command.to_string(),
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::UnsafeCommand {
                    field: "headless_command",
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_macro_commands_allowed() {
        let config = Config {
            sleep_command: "sync; xset dpms force off; systemctl suspend".to_string(),
            shutdown_command: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = Config {
            long_running_apps: "vlc|(mpv".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_negative_dpms_rejected() {
        let config = Config {
            dpms: Some(DpmsConfig {
                standby_seconds: -1,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDpms { .. })
        ));
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = Overrides {
            inactivity_timeout_ms: Some(1000),
            action: Some(ActionKind::Shutdown),
            headless_command: Some(String::new()),
            ..Default::default()
        };

        let config = overrides.apply(Config::default());
        assert_eq!(config.inactivity_timeout_ms, 1000);
        assert_eq!(config.action, ActionKind::Shutdown);
        assert_eq!(config.headless_command, "");
        assert_eq!(config.check_interval_seconds, 3600);
    }

    #[derive(clap::Parser)]
    struct Cli {
        #[command(flatten)]
        overrides: Overrides,
    }

    fn parse_overrides(args: &[&str]) -> Overrides {
        use clap::Parser;
        Cli::parse_from(std::iter::once("idlewarden").chain(args.iter().copied())).overrides
    }

    #[test]
    fn test_action_type_numeric_spellings() {
        let sleep = parse_overrides(&["--action-type", "0"]);
        assert_eq!(sleep.action, Some(ActionKind::Sleep));

        let shutdown = parse_overrides(&["--action-type", "1"]);
        assert_eq!(shutdown.action, Some(ActionKind::Shutdown));

        let named = parse_overrides(&["--action-type", "shutdown"]);
        assert_eq!(named.action, Some(ActionKind::Shutdown));
    }

    #[test]
    fn test_gui_command() {
        let config = Config::default();
        assert_eq!(config.gui_command(ActionKind::Sleep), DEFAULT_SLEEP_COMMAND);
        assert_eq!(
            config.gui_command(ActionKind::Shutdown),
            DEFAULT_SHUTDOWN_COMMAND
        );
    }

    #[test]
    fn test_state_paths() {
        let paths = StatePaths::for_home(Path::new("/home/user"));
        assert_eq!(paths.dir(), Path::new("/home/user/.idlewarden"));
        assert_eq!(
            paths.pid_file(),
            PathBuf::from("/home/user/.idlewarden/idlewarden.pids")
        );
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/home/user/.idlewarden/config.toml")
        );
    }
}
