use crate::audit::AuditTrail;
use crate::catalog::{Catalog, Target};
use crate::console::Console;
use crate::error::{Error, Result};
use crate::runnable::{Runnable, State, StatusReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "convoy",
    author,
    version,
    about = "Build, start and stop groups of local services"
)]
pub struct Cli {
    /// Config file (default: $CONVOY_CONFIG or convoy.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless CONVOY_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build services and groups
    Build {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Launch services and groups
    Start {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Stop running services
    Stop {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Stop, then start again
    Restart {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show which services are running (all when no names given)
    Status { names: Vec<String> },
    /// List directories watched for changes
    WatchDirs { names: Vec<String> },
    /// Report which targets need root
    Sudo { names: Vec<String> },
    /// Show recent entries from the audit trail
    Logs {
        #[arg(long, default_value_t = 20)]
        tail: usize,
    },
}

/// What a command runs against.
pub struct Session<'a> {
    pub catalog: &'a Catalog,
    pub audit: &'a AuditTrail,
    pub console: &'a Console,
    pub root: bool,
}

impl<'a> Session<'a> {
    pub fn new(catalog: &'a Catalog, audit: &'a AuditTrail, console: &'a Console) -> Self {
        let root = nix::unistd::geteuid().is_root();
        Self { catalog, audit, console, root }
    }

    /// Fail unless every target that needs root gets it.
    fn check_sudo(&self, targets: &[Target]) -> Result<()> {
        if self.root {
            return Ok(());
        }
        let needs: Vec<String> = targets
            .iter()
            .filter(|t| t.is_sudo())
            .map(|t| t.name().to_string())
            .collect();
        if needs.is_empty() { Ok(()) } else { Err(Error::SudoRequired(needs)) }
    }

    fn privileged(&self, names: &[String]) -> Result<Vec<Target>> {
        let targets = self.catalog.select(names)?;
        self.check_sudo(&targets)?;
        Ok(targets)
    }
}

impl Command {
    pub fn run(self, session: &Session<'_>) -> Result<()> {
        let console = session.console;
        match self {
            Command::Build { names } => {
                session.privileged(&names)?.iter().try_for_each(|t| t.build())
            }
            Command::Start { names } => {
                session.privileged(&names)?.iter().try_for_each(|t| t.start())
            }
            Command::Stop { names } => {
                session.privileged(&names)?.iter().try_for_each(|t| t.stop())
            }
            Command::Restart { names } => {
                session.privileged(&names)?.iter().try_for_each(|t| {
                    t.stop()?;
                    t.start()
                })
            }
            Command::Status { names } => {
                let mut report = StatusReport::default();
                for target in session.catalog.select(&names)? {
                    let part = target.status();
                    report.entries.extend(part.entries);
                    if part.error.is_some() {
                        report.error = part.error;
                        break;
                    }
                }
                console.line(&format!("{:<24} {:<8} {}", "NAME", "STATUS", "PID"));
                for entry in &report.entries {
                    let pid = match entry.state {
                        State::Running { pid } => pid.to_string(),
                        State::Stopped => "-".to_string(),
                    };
                    console.line(&format!("{:<24} {:<8} {}", entry.service, entry.state, pid));
                }
                report.into_result().map(|_| ())
            }
            Command::WatchDirs { names } => {
                for target in session.catalog.select(&names)? {
                    for (dir, service) in target.watch_dirs() {
                        console.line(&format!("{} -> {}", dir.display(), service.name()));
                    }
                }
                Ok(())
            }
            Command::Sudo { names } => {
                for target in session.catalog.select(&names)? {
                    let needs = if target.is_sudo() { "yes" } else { "no" };
                    console.line(&format!("{:<24} {needs}", target.name()));
                }
                Ok(())
            }
            Command::Logs { tail } => {
                session.audit.load_from_disk()?;
                for event in session.audit.tail(tail) {
                    console.line(&format!("{} [{}] {}", event.ts_ms, event.source, event.message));
                }
                Ok(())
            }
        }
    }
}
