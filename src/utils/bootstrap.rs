//! Process bootstrap helpers.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with an env-filter taken from `GROCERD_LOG`.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// First CLI argument as a configuration file path, if given.
pub fn parse_config_path() -> Option<String> {
    std::env::args().nth(1)
}
