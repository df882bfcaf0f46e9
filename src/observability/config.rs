//! Logging configuration
//!
//! Loaded from environment variables:
//! - `RUST_LOG`: filter directives (default: `info`)
//! - `MC_LOG_FORMAT`: `json` for structured output, anything else for text
//! - `MC_LOG_TARGETS`: include module targets in text output (default: false)

/// Output format of the fmt subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directives
    pub filter: String,
    pub format: LogFormat,
    /// Print event targets (module paths)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            format: LogFormat::Text,
            with_target: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        LogConfig {
            filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            format: match std::env::var("MC_LOG_FORMAT") {
                Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            with_target: std::env::var("MC_LOG_TARGETS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Verbose text output for debugging a single test.
    pub fn debug() -> Self {
        LogConfig {
            filter: "swarm_mc=debug".to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Text);
        assert!(!config.with_target);
    }

    #[test]
    fn test_debug_config() {
        assert!(LogConfig::debug().filter.contains("debug"));
    }
}
