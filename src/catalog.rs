use crate::config::{Config, GroupDef};
use crate::error::{Error, Result};
use crate::group::Group;
use crate::runnable::{Runnable, StatusReport, WatchDirs};
use crate::service::{Service, ServiceContext};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Every service and group declared in a config, resolved into trees.
pub struct Catalog {
    services: Vec<Service>,
    groups: HashMap<String, Arc<Group>>,
}

/// A service or group picked by name on the command line.
#[derive(Clone)]
pub enum Target {
    Service(Service),
    Group(Arc<Group>),
}

impl Catalog {
    /// Resolve group children by name. Unknown names, duplicates and group
    /// cycles are configuration errors.
    pub fn build(cfg: &Config, ctx: &ServiceContext) -> Result<Self> {
        let mut seen = HashSet::new();
        let names = cfg.services.iter().map(|s| &s.name);
        for name in names.chain(cfg.groups.iter().map(|g| &g.name)) {
            if !seen.insert(name.as_str()) {
                return Err(Error::Config(format!("duplicate name {name:?}")));
            }
        }

        let mut services = Vec::with_capacity(cfg.services.len());
        for def in &cfg.services {
            def.validate()?;
            services.push(Service::new(def.clone(), ctx.clone()));
        }
        let mut resolver = Resolver {
            ctx,
            services: services.iter().map(|s| (s.name().to_string(), s.clone())).collect(),
            defs: cfg.groups.iter().map(|g| (g.name.as_str(), g)).collect(),
            built: HashMap::new(),
            path: Vec::new(),
        };
        for def in &cfg.groups {
            resolver.group(&def.name)?;
        }
        let groups = resolver.built;
        tracing::debug!(services = services.len(), groups = groups.len(), "catalog built");
        Ok(Self { services, groups })
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn lookup(&self, name: &str) -> Result<Target> {
        if let Some(group) = self.groups.get(name) {
            return Ok(Target::Group(group.clone()));
        }
        self.services
            .iter()
            .find(|s| s.name() == name)
            .map(|s| Target::Service(s.clone()))
            .ok_or_else(|| Error::Unknown(name.to_string()))
    }

    /// Targets for `names`, or every service when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<Target>> {
        if names.is_empty() {
            return Ok(self.services.iter().cloned().map(Target::Service).collect());
        }
        names.iter().map(|n| self.lookup(n)).collect()
    }
}

struct Resolver<'a> {
    ctx: &'a ServiceContext,
    services: HashMap<String, Service>,
    defs: HashMap<&'a str, &'a GroupDef>,
    built: HashMap<String, Arc<Group>>,
    path: Vec<String>,
}

impl Resolver<'_> {
    fn group(&mut self, name: &str) -> Result<Arc<Group>> {
        if let Some(group) = self.built.get(name) {
            return Ok(group.clone());
        }
        if self.path.iter().any(|n| n == name) {
            let mut cycle = self.path.clone();
            cycle.push(name.to_string());
            return Err(Error::Config(format!("group cycle: {}", cycle.join(" -> "))));
        }
        let def = *self.defs.get(name).ok_or_else(|| Error::Unknown(name.to_string()))?;

        self.path.push(name.to_string());
        let mut group = Group::new(name)
            .logger(self.ctx.logger.clone())
            .console(self.ctx.console.clone());
        for child in &def.children {
            group = match self.services.get(child).cloned() {
                Some(service) => group.service(service),
                None if self.defs.contains_key(child.as_str()) => {
                    group.group(self.group(child)?)
                }
                None => return Err(Error::Unknown(child.clone())),
            };
        }
        self.path.pop();

        let group = Arc::new(group);
        self.built.insert(name.to_string(), group.clone());
        Ok(group)
    }
}

impl Runnable for Target {
    type Leaf = Service;

    fn name(&self) -> &str {
        match self {
            Target::Service(s) => s.name(),
            Target::Group(g) => g.name(),
        }
    }

    fn build(&self) -> Result<()> {
        match self {
            Target::Service(s) => s.build(),
            Target::Group(g) => g.build(),
        }
    }

    fn start(&self) -> Result<()> {
        match self {
            Target::Service(s) => s.start(),
            Target::Group(g) => g.start(),
        }
    }

    fn stop(&self) -> Result<()> {
        match self {
            Target::Service(s) => s.stop(),
            Target::Group(g) => g.stop(),
        }
    }

    fn status(&self) -> StatusReport {
        match self {
            Target::Service(s) => s.status(),
            Target::Group(g) => g.status(),
        }
    }

    fn is_sudo(&self) -> bool {
        match self {
            Target::Service(s) => s.is_sudo(),
            Target::Group(g) => g.is_sudo(),
        }
    }

    fn watch_dirs(&self) -> WatchDirs<Service> {
        match self {
            Target::Service(s) => s.watch_dirs(),
            Target::Group(g) => g.watch_dirs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::Console;
    use crate::interrupt::Interrupt;

    fn ctx() -> ServiceContext {
        let dir = std::env::temp_dir().join("convoy_catalog");
        let mut ctx = ServiceContext::new(dir, Interrupt::new());
        ctx.console = Console::buffer().0;
        ctx
    }

    fn catalog(toml: &str) -> Result<Catalog> {
        Catalog::build(&Config::parse(toml)?, &ctx())
    }

    const TREE: &str = r#"
[[services]]
name = "db"
[[services]]
name = "api"
sudo = true
[[services]]
name = "web"

[[groups]]
name = "all"
children = ["web", "backend"]
[[groups]]
name = "backend"
children = ["db", "api"]
"#;

    #[test]
    fn resolves_children_in_listed_order() {
        let cat = catalog(TREE).unwrap();
        let Target::Group(all) = cat.lookup("all").unwrap() else { panic!("expected group") };

        let services: Vec<_> = all.services().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(services, vec!["web"]);
        assert_eq!(all.groups()[0].name(), "backend");
        assert_eq!(all.groups()[0].services()[1].name(), "api");
        assert!(all.is_sudo());
    }

    #[test]
    fn groups_are_shared_between_parents() {
        let cat = catalog(TREE).unwrap();
        let group = |name: &str| match cat.lookup(name).unwrap() {
            Target::Group(g) => g,
            Target::Service(_) => panic!("expected group {name}"),
        };
        assert!(Arc::ptr_eq(&group("all").groups()[0], &group("backend")));
    }

    #[test]
    fn rejects_env_without_equals() {
        let err = catalog("[[services]]\nname = \"api\"\nenv = [\"PORT8080\"]").err().unwrap();
        assert!(matches!(err, Error::Config(msg) if msg.contains("PORT8080")));
    }

    #[test]
    fn select_defaults_to_every_service() {
        let cat = catalog(TREE).unwrap();
        let selected = cat.select(&[]).unwrap();
        let names: Vec<_> = selected.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["db", "api", "web"]);
        assert!(matches!(cat.select(&["nope".into()]), Err(Error::Unknown(n)) if n == "nope"));
    }

    #[test]
    fn rejects_unknown_child() {
        let err = catalog("[[groups]]\nname = \"g\"\nchildren = [\"ghost\"]").err().unwrap();
        assert!(matches!(err, Error::Unknown(n) if n == "ghost"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = catalog("[[services]]\nname = \"x\"\n[[groups]]\nname = \"x\"").err().unwrap();
        assert!(matches!(err, Error::Config(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_cycles() {
        let err = catalog(
            r#"
[[groups]]
name = "a"
children = ["b"]
[[groups]]
name = "b"
children = ["c"]
[[groups]]
name = "c"
children = ["a"]
"#,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(msg) if msg == "group cycle: a -> b -> c -> a"));
    }

    #[test]
    fn rejects_self_reference() {
        let err = catalog("[[groups]]\nname = \"a\"\nchildren = [\"a\"]").err().unwrap();
        assert!(matches!(err, Error::Config(msg) if msg == "group cycle: a -> a"));
    }
}
