use crate::error::Result;
use crate::service::ServiceDef;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_launch_grace_ms")]
    pub launch_grace_ms: u64,
    /// How long `stop` waits for a service to exit.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default)]
    pub services: Vec<ServiceDef>,
    #[serde(default)]
    pub groups: Vec<GroupDef>,
}

/// A named group; `children` name services or other groups.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupDef {
    pub name: String,
    #[serde(default)]
    pub children: Vec<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from(".convoy") }
fn default_launch_grace_ms() -> u64 { 250 }
fn default_stop_timeout_ms() -> u64 { 5000 }

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            launch_grace_ms: default_launch_grace_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            services: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl Config {
    pub fn launch_grace(&self) -> Duration {
        Duration::from_millis(self.launch_grace_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Load configuration from `path`, else `CONVOY_CONFIG`, else `convoy.toml`.
/// A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var("CONVOY_CONFIG").unwrap_or_else(|_| "convoy.toml".into()).into(),
    };
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        tracing::debug!(path = %config_path.display(), "loading config");
        Config::parse(&content)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing() {
        let cfg = load_config(Some(Path::new("___does_not_exist___convoy.toml"))).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.data_dir, PathBuf::from(".convoy"));
        assert_eq!(cfg.launch_grace(), Duration::from_millis(250));
        assert_eq!(cfg.stop_timeout(), Duration::from_secs(5));
        assert!(cfg.services.is_empty());
    }

    #[test]
    fn reads_env_path() {
        let path = std::env::temp_dir().join(format!("convoy_cfg_{}.toml", std::process::id()));
        std::fs::write(&path, "log_level = \"debug\"\ndata_dir = \"state\"").unwrap();

        unsafe { std::env::set_var("CONVOY_CONFIG", &path); }
        let cfg = load_config(None).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.data_dir, PathBuf::from("state"));

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn parses_services_and_groups() {
        let cfg = Config::parse(
            r#"
launch_grace_ms = 10
stop_timeout_ms = 750

[[services]]
name = "api"
path = "services/api"
sudo = true
watch = ["services/api/src"]
env = ["PORT=8080"]
[services.commands]
build = "make"
launch = "./bin/api"

[[services]]
name = "db"

[[groups]]
name = "backend"
children = ["db", "api"]
"#,
        )
        .unwrap();

        assert_eq!(cfg.launch_grace_ms, 10);
        assert_eq!(cfg.stop_timeout(), Duration::from_millis(750));
        assert_eq!(cfg.services.len(), 2);
        let api = &cfg.services[0];
        assert!(api.sudo);
        assert_eq!(api.commands.build.as_deref(), Some("make"));
        assert_eq!(api.commands.stop, None);
        assert!(cfg.services[1].commands.launch.is_none());
        assert_eq!(cfg.groups[0].children, vec!["db", "api"]);
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(Config::parse("services = 3").is_err());
    }
}
