//! Orchestrates trees of local services: groups of services and nested
//! groups share one lifecycle (build, start, stop, status, sudo check and
//! watch discovery), and each service command runs under a tracker that
//! reports progress and halts the process on Ctrl-C.

pub mod audit;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod group;
pub mod interrupt;
pub mod runnable;
pub mod service;
pub mod telemetry;
pub mod tracker;

pub use audit::{AuditTrail, Event, Logger, SharedLogger};
pub use catalog::{Catalog, Target};
pub use cli::{Cli, Command, Session};
pub use config::{load_config, Config};
pub use console::{Console, Tone};
pub use error::{Error, Result};
pub use group::Group;
pub use interrupt::{Halt, Interrupt};
pub use runnable::{Runnable, State, StatusEntry, StatusReport, WatchDirs};
pub use service::{Service, ServiceContext, ServiceDef};
pub use telemetry::init_telemetry;
pub use tracker::{CommandTracker, RunningTracker};
