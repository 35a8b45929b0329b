//! idlewarden - idle-detection daemon.
//!
//! Suspends or shuts down the machine once nobody has used it for the
//! configured time and nothing else keeps it busy.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::SignalKind;
use tokio::signal::unix::signal;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use idlewarden::config::Config;
use idlewarden::config::Overrides;
use idlewarden::config::StatePaths;
use idlewarden::domain::CycleState;
use idlewarden::dpms;
use idlewarden::engine::DecisionEngine;
use idlewarden::environment;
use idlewarden::environment::SessionEnv;
use idlewarden::executor::ActionExecutor;
use idlewarden::executor::ActionOutcome;
use idlewarden::logfile::LogFile;
use idlewarden::probe;
use idlewarden::probe::ChildTracker;
use idlewarden::process;
use idlewarden::registry::ProcessRegistry;
use idlewarden::sampler::SystemSignals;
use idlewarden::x11::X11Server;

/// Longest process name the kernel keeps in `/proc/<pid>/comm`.
const COMM_MAX_LEN: usize = 15;

/// Time `--stop` gives processes to exit after SIGTERM before SIGKILL.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Without it the I/O veto is blind.
const REQUIRED_TOOLS: &[&str] = &["iostat"];

/// Display idle time, display probe and DPMS need these.
const DISPLAY_TOOLS: &[&str] = &["xprintidle", "xset"];

/// Idle-detection daemon.
///
/// Puts the machine to sleep or shuts it down when neither a user nor the
/// system has been active for the configured time.
#[derive(Parser, Debug)]
#[command(name = "idlewarden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log decisions, never run commands).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run a single check cycle, then exit.
    #[arg(long)]
    oneshot: bool,

    /// Stop running instances and their helpers, then exit.
    #[arg(long, conflicts_with = "oneshot")]
    stop: bool,

    /// Print the resolved configuration as TOML, then exit.
    #[arg(long)]
    print_config: bool,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let exe = std::env::current_exe().context("Cannot determine own executable path")?;
    let exe_name = exe
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("Own executable path has no file name")?;

    // --home wins over the persisted home, which wins over $HOME
    let default_home = args.overrides.home.clone().or_else(dirs::home_dir);
    let default_config = match (&args.config, &default_home) {
        (Some(path), _) => path.clone(),
        (None, Some(home)) => StatePaths::for_home(home).config_file(),
        (None, None) => anyhow::bail!("Cannot determine home directory, pass --home"),
    };

    let config = Config::load_or_default(args.config.as_deref(), &default_config)
        .context("Failed to load configuration")?;
    let config = args.overrides.clone().apply(config);
    config.validate().context("Invalid configuration")?;

    let home = config
        .home
        .clone()
        .or(default_home)
        .context("Cannot determine home directory, pass --home")?;
    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let paths = StatePaths::for_home(&home);
    paths.ensure_exists()?;

    init_logging(&args.log_level, LogFile::new(paths.log_file()))?;

    if args.stop {
        return run_stop(&paths, &exe_name).await;
    }

    info!("idlewarden v{} starting", env!("CARGO_PKG_VERSION"));
    log_banner(&config, &paths, &default_config, args.dry_run);
    check_tools()?;

    run_daemon(Arc::new(config), &paths, args.dry_run, args.oneshot).await
}

/// Log to stderr and to the size-capped log file.
fn init_logging(level: &str, log_file: LogFile) -> Result<()> {
    let filter = EnvFilter::try_new(format!("idlewarden={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(log_file),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

fn log_banner(config: &Config, paths: &StatePaths, config_file: &Path, dry_run: bool) {
    info!("State directory: {}", paths.dir().display());
    info!("Config file: {}", config_file.display());
    info!(
        "Inactivity timeout: {}s, long-running apps timeout: {}s ({})",
        config.inactivity_timeout().as_secs(),
        config.long_running_apps_timeout().as_secs(),
        config.long_running_apps
    );
    info!(
        "Thresholds: CPU {}%, I/O {} KB/s, network {} KB/s",
        config.cpu_threshold_percent, config.io_threshold_kbps, config.net_threshold_kbps
    );
    info!(
        "Check interval: {}s, CPU/network window: {}s, I/O window: {}s, boot grace: {} min",
        config.check_interval_seconds,
        config.cpu_net_window_seconds,
        config.io_window_seconds,
        config.boot_grace_minutes
    );
    info!(
        "Action: {} (sleep: {:?}, shutdown: {:?}, no-GUI: {:?})",
        config.action, config.sleep_command, config.shutdown_command, config.headless_command
    );
    if dry_run {
        info!("Dry-run mode: commands will only be logged");
    }
}

/// Refuse to start without the I/O tool; warn once about display tools.
fn check_tools() -> Result<()> {
    let missing = probe::missing_tools(REQUIRED_TOOLS);
    if !missing.is_empty() {
        error!("Required tools not found in PATH: {}", missing.join(", "));
        anyhow::bail!("Missing required tools: {}", missing.join(", "));
    }

    let missing = probe::missing_tools(DISPLAY_TOOLS);
    if !missing.is_empty() {
        error!(
            "Display tools not found in PATH: {} (display sessions will be treated as active or absent)",
            missing.join(", ")
        );
    }
    Ok(())
}

/// Stop registered helpers and other running instances.
async fn run_stop(paths: &StatePaths, exe_name: &str) -> Result<()> {
    let own_pid = std::process::id();
    let registry = ProcessRegistry::new(paths.pid_file());
    let from_registry = registry.stop(own_pid, STOP_GRACE).await?;

    let comm: String = exe_name.chars().take(COMM_MAX_LEN).collect();
    let instances: Vec<u32> = process::list_processes()
        .into_iter()
        .filter(|entry| entry.pid != own_pid && entry.name == comm)
        .map(|entry| entry.pid)
        .collect();
    let from_scan = process::terminate_all(&instances, STOP_GRACE).await;

    info!(
        "Stop requested: stopped {} registered process(es) and {} instance(s)",
        from_registry, from_scan
    );
    Ok(())
}

/// Cancel `token` on SIGTERM or SIGINT.
fn spawn_signal_listener(token: CancellationToken) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        token.cancel();
    });

    Ok(())
}

/// Run check cycles until cancelled.
async fn run_daemon(
    config: Arc<Config>,
    paths: &StatePaths,
    dry_run: bool,
    oneshot: bool,
) -> Result<()> {
    let own_pid = std::process::id();
    let registry = ProcessRegistry::new(paths.pid_file());
    let tracker = match registry.start(own_pid) {
        Ok(()) => ChildTracker::with_registry(registry.clone()),
        Err(e) => {
            warn!("PID tracking unavailable: {:#}", e);
            ChildTracker::new()
        }
    };

    let env = SessionEnv::from_env();
    for diag in env.diagnostics() {
        debug!("{}", diag);
    }

    if let Some(ref dpms_config) = config.dpms {
        if environment::has_display_session(&env, &X11Server::new(tracker.clone())).await {
            dpms::configure(&tracker, dpms_config).await;
        } else {
            info!("No display session, skipping DPMS setup");
        }
    }

    let pattern = config
        .long_running_pattern()
        .context("Invalid long-running apps pattern")?;
    let engine = DecisionEngine::from_config(&config);
    let executor = ActionExecutor::new(config.clone(), tracker.clone(), dry_run);
    let mut signals = SystemSignals::new(config.clone(), pattern, tracker.clone(), env);

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone())?;

    info!("Daemon started, checking every {}s", config.check_interval_seconds);

    loop {
        registry.prune();

        let evaluation = tokio::select! {
            () = shutdown.cancelled() => break,
            evaluation = engine.evaluate(&mut signals) => evaluation,
        };
        debug!("Cycle finished in state {}", evaluation.state);

        if evaluation.decision.is_action() && !shutdown.is_cancelled() {
            match executor.execute(evaluation.decision, &shutdown).await {
                Ok(ActionOutcome::Completed { .. } | ActionOutcome::DryRun { .. }) => {
                    info!("State: {}", CycleState::ActionTaken);
                }
                Ok(ActionOutcome::Interrupted) => break,
                Ok(_) => {}
                Err(e) => warn!("Action failed: {:#}", e),
            }
        }

        if oneshot {
            info!("Oneshot mode complete");
            break;
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(config.check_interval()) => {}
        }
    }

    info!("idlewarden exiting");
    Ok(())
}
