//! Bootstrap utilities for the server binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{CONFIG_ENV_VAR, LOG_ENV_VAR};

/// Initialize tracing with the RULEHOST_LOG environment variable.
///
/// Defaults to "info" level if RULEHOST_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Config file path from `--config <path>` (or `--config=<path>`), falling
/// back to RULEHOST_CONFIG.
pub fn parse_config_path() -> Option<String> {
    config_path_from(std::env::args().skip(1)).or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
}

fn config_path_from(mut args: impl Iterator<Item = String>) -> Option<String> {
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_config_flag_with_separate_value() {
        assert_eq!(
            config_path_from(args(&["--config", "/etc/rulehost.yaml"])),
            Some("/etc/rulehost.yaml".to_string())
        );
        assert_eq!(
            config_path_from(args(&["-v", "-c", "local.yaml"])),
            Some("local.yaml".to_string())
        );
    }

    #[test]
    fn test_config_flag_with_equals() {
        assert_eq!(
            config_path_from(args(&["--config=local.yaml"])),
            Some("local.yaml".to_string())
        );
    }

    #[test]
    fn test_missing_config_flag() {
        assert_eq!(config_path_from(args(&["--verbose"])), None);
        assert_eq!(config_path_from(args(&["--config"])), None);
    }
}
