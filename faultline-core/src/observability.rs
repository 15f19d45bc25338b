//! Logging initialisation
//!
//! Installs a global `tracing` subscriber: an [`EnvFilter`] (`RUST_LOG` wins
//! over the configured level) and a `fmt` layer in pretty or compact form
//! writing to stderr.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{FaultlineError, FaultlineResult};

/// Install the global subscriber described by `config`
///
/// Fails if a global subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> FaultlineResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            FaultlineError::configuration("observability.logging.level", e.to_string())
        })?;

    let span_events = if config.verbose {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let installed = match config.format.as_str() {
        "compact" => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .compact()
                    .with_target(config.verbose)
                    .with_span_events(span_events),
            ),
        ),
        "pretty" => tracing::subscriber::set_global_default(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .pretty()
                    .with_target(config.verbose)
                    .with_span_events(span_events),
            ),
        ),
        other => {
            return Err(FaultlineError::configuration(
                "observability.logging.format",
                format!("Invalid log format: {}", other),
            ))
        }
    };

    installed.map_err(|e| {
        FaultlineError::configuration("observability.logging", format!("{}", e))
    })
}
