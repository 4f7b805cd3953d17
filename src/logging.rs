//! Log subscriber setup for binaries and embedders that don't bring their own.

use tracing_subscriber::{fmt, EnvFilter};

use crate::core::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `BEECONNECT_LOG_JSON=1` selects JSON, anything else pretty output.
    pub fn from_env() -> Self {
        match std::env::var(paths::env::LOG_JSON) {
            Ok(value) if value == "1" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_logging() {
    init_logging_with(LogFormat::from_env(), "info");
}

/// Installs a stderr subscriber. `RUST_LOG` wins over `default_filter`.
/// A second call is a no-op.
pub fn init_logging_with(format: LogFormat, default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
