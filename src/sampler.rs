//! Live signal sources backed by `/proc`, external tools and the X server.

pub mod apps;
pub mod cpu;
pub mod io;
pub mod net;
pub mod tty;
pub mod uptime;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use crate::config::Config;
use crate::domain::Sample;
use crate::engine::ActivitySignals;
use crate::environment;
use crate::environment::SessionEnv;
use crate::probe::ChildTracker;
use crate::probe::ProbeError;
use crate::x11::X11Server;

/// Signals read from the running system.
pub struct SystemSignals {
    config: Arc<Config>,
    pattern: Regex,
    tracker: ChildTracker,
    env: SessionEnv,
    x11: X11Server,
    own_pid: u32,
    last_uptime: Duration,
}

impl SystemSignals {
    pub fn new(config: Arc<Config>, pattern: Regex, tracker: ChildTracker, env: SessionEnv) -> Self {
        let x11 = X11Server::new(tracker.clone());
        Self {
            config,
            pattern,
            tracker,
            env,
            x11,
            own_pid: std::process::id(),
            last_uptime: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ActivitySignals for SystemSignals {
    async fn uptime(&mut self) -> Result<Duration, ProbeError> {
        let uptime = uptime::read_uptime()?;
        self.last_uptime = uptime;
        Ok(uptime)
    }

    async fn has_display_session(&mut self) -> bool {
        environment::has_display_session(&self.env, &self.x11).await
    }

    async fn long_running_app(&mut self) -> Sample {
        apps::sample(&self.pattern, self.own_pid)
    }

    async fn display_idle(&mut self) -> Result<Duration, ProbeError> {
        self.x11.idle_time().await
    }

    async fn tty_activity(&mut self) -> Sample {
        tty::sample(self.config.inactivity_timeout(), self.last_uptime)
    }

    async fn cpu(&mut self) -> Sample {
        cpu::sample(self.config.cpu_threshold_percent, self.config.cpu_net_window()).await
    }

    async fn io(&mut self) -> Sample {
        io::sample(
            &self.tracker,
            self.config.io_threshold_kbps,
            self.config.io_window(),
        )
        .await
    }

    async fn net(&mut self) -> Sample {
        net::sample(self.config.net_threshold_kbps, self.config.cpu_net_window()).await
    }
}
