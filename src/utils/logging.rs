//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level when it is set.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    /// Print the module path of each event
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            show_target: false,
            show_thread_ids: false,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Debug level with targets and thread ids
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            ansi: true,
        }
    }

    pub fn quiet() -> Self {
        Self {
            level: Level::ERROR,
            ..Self::default()
        }
    }

    /// Plain output for log collectors when serving
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            show_target: true,
            show_thread_ids: false,
            ansi: false,
        }
    }

    /// Override the level by name; unknown names keep the current level
    pub fn with_level_name(mut self, name: &str) -> Self {
        if let Some(level) = parse_level(name) {
            self.level = level;
        }
        self
    }
}

/// Parse a level name, accepting `warning` for `warn`
pub fn parse_level(name: &str) -> Option<Level> {
    let name = name.trim().to_ascii_lowercase();
    let name = if name == "warning" { "warn" } else { name.as_str() };
    Level::from_str(name).ok()
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_ascii_lowercase()))
}

/// Install the global subscriber
///
/// Fails if one is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    fmt()
        .with_env_filter(build_filter(config))
        .with_ansi(config.ansi)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .compact()
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level(" error "), Some(Level::ERROR));
        assert_eq!(parse_level("nonsense"), None);
    }

    #[test]
    fn test_presets() {
        assert_eq!(LogConfig::verbose().level, Level::DEBUG);
        assert_eq!(LogConfig::quiet().level, Level::ERROR);
        assert!(!LogConfig::production().ansi);
    }

    #[test]
    fn test_unknown_level_name_is_ignored() {
        let config = LogConfig::default().with_level_name("loud");
        assert_eq!(config.level, Level::INFO);
        assert_eq!(LogConfig::default().with_level_name("trace").level, Level::TRACE);
    }
}
