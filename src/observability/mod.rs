//! Structured logging.
//!
//! Engines log through `tracing` macros: `info!` for run start and end,
//! `debug!` for worker lifecycle and SCC finalization, `warn!` for stops and
//! collective aborts. Workers run inside a `worker` span, ranks inside a
//! `rank` span.

mod config;

pub use config::{LogConfig, LogFormat};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Returns false if one was already
/// installed (for instance by an earlier test), which is harmless.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(true);
    match config.format {
        LogFormat::Json => builder.json().try_init().is_ok(),
        LogFormat::Text => builder.try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig::default();
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
