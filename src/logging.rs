use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Crates whose logs are enabled at the configured level; everything else
/// stays at `warn` so dependency noise cannot flood the output.
const LOGGING_ENABLED_CRATES: &[&str] = &["sm_probe_agent"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Compact single-line output instead of the default formatter.
    pub compact: bool,
}

impl LoggingConfig {
    /// Attempts to initialize the global tracing subscriber with the inner
    /// configuration. `RUST_LOG` overrides the configured directives.
    pub fn try_init(&self) -> Result<(), LoggingError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.directives()));

        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if self.compact {
            builder.compact().try_init()
        } else {
            builder.try_init()
        };
        result.map_err(|err| LoggingError::TryInitError(err.to_string()))
    }

    fn directives(&self) -> String {
        let mut directives = vec!["warn".to_string()];
        directives.extend(
            LOGGING_ENABLED_CRATES
                .iter()
                .map(|krate| format!("{krate}={}", self.level.as_str())),
        );
        directives.join(",")
    }
}
