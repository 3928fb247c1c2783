use crate::config::Config;
use tracing_subscriber::{filter::EnvFilter, fmt};

/// Filter directive in priority order: `CONVOY_LOG`, then `--verbose`,
/// then the config's `log_level`.
fn directive(env: Option<String>, verbose: bool, configured: &str) -> String {
    match env {
        Some(spec) if !spec.trim().is_empty() => spec,
        _ if verbose => "debug".to_string(),
        _ => configured.to_string(),
    }
}

/// Install the global subscriber. Logs go to stderr since stdout carries
/// progress output; a directive that fails to parse falls back to `info`.
pub fn init_telemetry(cfg: &Config, verbose: bool) {
    let spec = directive(std::env::var("CONVOY_LOG").ok(), verbose, &cfg.log_level);
    let filter = EnvFilter::try_new(&spec).unwrap_or_else(|err| {
        eprintln!("convoy: bad log filter {spec:?} ({err}), using info");
        EnvFilter::new("info")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();

    tracing::debug!(filter = %spec, "telemetry initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_wins_over_everything() {
        let spec = directive(Some("convoy=trace".into()), true, "warn");
        assert_eq!(spec, "convoy=trace");
    }

    #[test]
    fn verbose_beats_config_level() {
        assert_eq!(directive(None, true, "warn"), "debug");
        assert_eq!(directive(Some("  ".into()), true, "warn"), "debug");
    }

    #[test]
    fn config_level_is_the_fallback() {
        assert_eq!(directive(None, false, "warn"), "warn");
    }

    #[test]
    fn init_smoke() {
        let cfg = Config { log_level: "not a [valid filter".into(), ..Config::default() };
        init_telemetry(&cfg, false);
        // A second init is ignored.
        init_telemetry(&cfg, true);
        tracing::debug!("debug after init");
    }
}
