use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Observed state of one leaf service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Running { pid: u32 },
    Stopped,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Running { .. } => f.pad("RUNNING"),
            State::Stopped => f.pad("STOPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub service: String,
    pub state: State,
}

/// Entries gathered by a status query. `error` is set when the walk stopped
/// early; `entries` then holds whatever was collected before it.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub entries: Vec<StatusEntry>,
    pub error: Option<Error>,
}

impl StatusReport {
    pub fn ok(entries: Vec<StatusEntry>) -> Self {
        Self { entries, error: None }
    }

    pub fn into_result(self) -> Result<Vec<StatusEntry>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.entries),
        }
    }
}

/// Directory -> leaf service that registered it.
pub type WatchDirs<L> = BTreeMap<PathBuf, L>;

/// Lifecycle shared by leaf services and groups.
pub trait Runnable {
    /// Handle type of the leaf services reachable from this node.
    type Leaf: Clone;

    fn name(&self) -> &str;
    fn build(&self) -> Result<()>;
    fn start(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn status(&self) -> StatusReport;

    // Whether any part of this node needs root to run.
    fn is_sudo(&self) -> bool;

    fn watch_dirs(&self) -> WatchDirs<Self::Leaf>;
}
