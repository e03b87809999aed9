use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "dsrs_rag=debug";
static SUBSCRIBER_INSTALLED: OnceLock<LogFormat> = OnceLock::new();

/// Output layout of the global subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line spans, meant for interactive runs.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid tracing filter directive `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs the process-global subscriber with [`LogFormat::Pretty`].
///
/// `RUST_LOG` wins when it parses; otherwise `dsrs_rag=debug` is used.
/// Calling it again after a successful install is a no-op.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    init_tracing_with(LogFormat::default())
}

pub fn init_tracing_with(format: LogFormat) -> Result<(), TelemetryInitError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = resolve_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Pretty => {
            tracing::subscriber::set_global_default(builder.pretty().with_target(false).finish())?
        }
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().with_target(true).finish())?
        }
    }

    let _ = SUBSCRIBER_INSTALLED.set(format);
    Ok(())
}

fn resolve_filter() -> Result<EnvFilter, TelemetryInitError> {
    EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(DEFAULT_FILTER).map_err(|source| TelemetryInitError::InvalidFilter {
            directive: DEFAULT_FILTER.to_string(),
            source,
        })
    })
}
