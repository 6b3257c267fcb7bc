//! tracing-subscriber setup for applications embedding phr

use crate::config::LoggingConfig;

/// Install a global subscriber from the logging config.
///
/// `RUST_LOG` overrides `level` when set. Returns false if a global subscriber
/// was already installed by the host application.
pub fn init_logging(config: &LoggingConfig) -> bool {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
    };
    result.is_ok()
}
