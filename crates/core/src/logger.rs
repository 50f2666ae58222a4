use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Maps a configured level name onto a tracing level, falling back to `info`.
pub fn parse_log_level(log_level: &str) -> (tracing::Level, bool) {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => (tracing::Level::TRACE, true),
        "debug" => (tracing::Level::DEBUG, true),
        "info" => (tracing::Level::INFO, true),
        "warn" => (tracing::Level::WARN, true),
        "error" => (tracing::Level::ERROR, true),
        _ => (tracing::Level::INFO, false),
    }
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins over `log_level` when it is set.
pub fn init_logger(log_level: &str) {
    let (level, recognised) = parse_log_level(log_level);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !recognised {
        warn!("Invalid log level '{}', defaulting to 'info'", log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("DEBUG"), (tracing::Level::DEBUG, true));
        assert_eq!(parse_log_level(" warn "), (tracing::Level::WARN, true));
        assert_eq!(parse_log_level("verbose"), (tracing::Level::INFO, false));
    }
}
