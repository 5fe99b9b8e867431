use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber, best effort: when the embedder
/// already set one up, the existing subscriber wins.
pub(crate) fn install(config: &LoggingConfig) {
    let filter = EnvFilter::try_new(&config.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.path.is_empty() {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        return;
    }

    match OpenOptions::new().create(true).append(true).open(&config.path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .try_init();
        }
        Err(err) => {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
            tracing::warn!(path = %config.path, "log file unavailable, using stderr: {err}");
        }
    }
}
