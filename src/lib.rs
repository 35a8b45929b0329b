//! idlewarden - puts an idle machine to sleep or shuts it down.
//!
//! Every check interval the daemon decides whether anyone is using the machine
//! (display idle time or TTY activity) and whether the machine itself is busy
//! (CPU, disk I/O, network). When both answers are "no" it runs the configured
//! command.

pub mod config;
pub mod domain;
pub mod dpms;
pub mod engine;
pub mod environment;
pub mod executor;
pub mod logfile;
pub mod probe;
pub mod process;
pub mod registry;
pub mod sampler;
pub mod x11;
