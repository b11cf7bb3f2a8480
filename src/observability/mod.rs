//! # Observability
//!
//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the filter is derived from `LOG_LEVEL`.
//! `LOG_FORMAT=json` switches to one JSON object per line for log collectors.

use crate::config::{LogFormat, TestEnvConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Filter directive used when `RUST_LOG` is not set
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.to_ascii_uppercase().as_str() {
        "ERROR" => "error",
        "WARN" | "WARNING" => "warn",
        "DEBUG" => "debug",
        "TRACE" => "trace",
        _ => "info",
    };
    // Keep the HTTP stack quiet unless explicitly asked for
    format!("{level},hyper=warn,reqwest=warn,rustls=warn,tower_http={level}")
}

/// Install the global subscriber
///
/// Fails when a subscriber is already installed.
pub fn init_tracing(config: &TestEnvConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_from_log_level() {
        assert!(default_directive("DEBUG").starts_with("debug,"));
        assert!(default_directive("warning").starts_with("warn,"));
        assert!(default_directive("nonsense").starts_with("info,"));
        assert!(default_directive("INFO").ends_with("tower_http=info"));
    }

    #[test]
    fn test_directive_parses() {
        for level in ["ERROR", "WARN", "INFO", "DEBUG", "TRACE"] {
            assert!(default_directive(level).parse::<EnvFilter>().is_ok());
        }
    }
}
