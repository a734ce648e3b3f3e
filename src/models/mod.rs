//! Configuration models resolved at startup.
pub mod config;
pub mod database;
pub mod environment;

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while resolving the runtime configuration. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid DATABASE_URL: {reason}")]
    ConfigParse { reason: String },
    #[error("SECRET_KEY is not set")]
    MissingSecret,
    #[error("SECRET_KEY must be at least {min} bytes long, got {len}")]
    WeakSecret { len: usize, min: usize },
    #[error("{0} is required but not set")]
    MissingVariable(&'static str),
    #[error("invalid allowed host `{0}`")]
    InvalidHost(String),
    #[error("failed to read environment")]
    Source(#[from] ::config::ConfigError),
}

impl ConfigError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::ConfigParse {
            reason: reason.into(),
        }
    }
}
