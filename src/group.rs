use crate::audit::{emit, SharedLogger};
use crate::console::Console;
use crate::error::Result;
use crate::runnable::{Runnable, StatusReport, WatchDirs};
use crate::service::Service;
use std::sync::Arc;

/// A set of services and nested groups managed together.
///
/// Build and start visit sub-groups before the group's own services; stop,
/// status, sudo and watch discovery visit services first. Every walk keeps
/// listed order and stops at the first failing child.
pub struct Group<S = Service> {
    name: String,
    services: Vec<S>,
    groups: Vec<Arc<Group<S>>>,
    logger: Option<SharedLogger>,
    console: Console,
}

impl<S: Runnable<Leaf = S> + Clone> Group<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            groups: Vec::new(),
            logger: None,
            console: Console::stdout(),
        }
    }

    pub fn service(mut self, service: S) -> Self {
        self.services.push(service);
        self
    }

    pub fn group(mut self, group: Arc<Group<S>>) -> Self {
        self.groups.push(group);
        self
    }

    pub fn logger(mut self, logger: Option<SharedLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn console(mut self, console: Console) -> Self {
        self.console = console;
        self
    }

    pub fn services(&self) -> &[S] {
        &self.services
    }

    pub fn groups(&self) -> &[Arc<Group<S>>] {
        &self.groups
    }

    fn announce(&self, line: String) {
        tracing::info!(target: "convoy::group", group = %self.name, "{line}");
        self.console.line(&line);
        emit(&self.logger, "group", &line);
    }
}

impl<S: Runnable<Leaf = S> + Clone> Runnable for Group<S> {
    type Leaf = S;

    fn name(&self) -> &str {
        &self.name
    }

    fn build(&self) -> Result<()> {
        self.announce(format!("Building group: {}", self.name));
        for group in &self.groups {
            group.build()?;
        }
        for service in &self.services {
            service.build()?;
        }
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.announce(format!("Starting group: {}", self.name));
        // A failure in a dependency group fails this group too.
        for group in &self.groups {
            group.start()?;
        }
        for service in &self.services {
            service.start()?;
        }
        Ok(())
    }

    // Same order as start: shutdown is not reversed.
    fn stop(&self) -> Result<()> {
        self.announce(format!("=== Group: {} ===", self.name));
        for service in &self.services {
            service.stop().map_err(|e| e.traced("stop", &self.name))?;
        }
        for group in &self.groups {
            group.stop().map_err(|e| e.traced("stop", &self.name))?;
        }
        Ok(())
    }

    fn status(&self) -> StatusReport {
        let mut out = StatusReport::default();
        let children = self
            .services
            .iter()
            .map(|s| s.status())
            .chain(self.groups.iter().map(|g| g.status()));
        // Lazy chain: children after a failure are never queried.
        for report in children {
            out.entries.extend(report.entries);
            if let Some(err) = report.error {
                out.error = Some(err.traced("status", &self.name));
                break;
            }
        }
        out
    }

    fn is_sudo(&self) -> bool {
        self.services.iter().any(|s| s.is_sudo()) || self.groups.iter().any(|g| g.is_sudo())
    }

    fn watch_dirs(&self) -> WatchDirs<S> {
        let mut dirs = WatchDirs::new();
        for service in &self.services {
            dirs.extend(service.watch_dirs());
        }
        for group in &self.groups {
            dirs.extend(group.watch_dirs());
        }
        dirs
    }
}
