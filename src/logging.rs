use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::ExportError;

/// Install a global tracing subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `logging.level`. Calling this twice is an
/// error from the subscriber registry, which callers that only want
/// best-effort logging can ignore.
pub fn init(logging: &LoggingSettings) -> Result<(), ExportError> {
    let env_filter = EnvFilter::builder()
        .parse(&logging.level)
        .map_err(|err| ExportError::Config(format!("invalid log level '{}': {err}", logging.level)))?;
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(directives).unwrap_or(env_filter)
        }
        _ => env_filter,
    };

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| ExportError::Internal(format!("failed to install tracing subscriber: {err}")))
}
