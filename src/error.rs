use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the calendar engine
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Calendar provider error: {0}")]
    #[diagnostic(code(famcal::provider))]
    Provider(String),

    #[error("Family directory error: {0}")]
    #[diagnostic(code(famcal::directory))]
    Directory(String),

    #[error("Persistence error: {0}")]
    #[diagnostic(code(famcal::persistence))]
    Persistence(String),

    #[error("Environment error: {0}")]
    #[diagnostic(code(famcal::environment))]
    Environment(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(famcal::config))]
    Config(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(famcal::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(famcal::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(famcal::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(famcal::other))]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type CalendarResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Environment(format!("Missing environment variable: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create provider errors
pub fn provider_error(message: &str) -> Error {
    Error::Provider(message.to_string())
}

/// Helper to create directory errors
pub fn directory_error(message: &str) -> Error {
    Error::Directory(message.to_string())
}

/// Helper to create persistence errors
pub fn persistence_error(message: &str) -> Error {
    Error::Persistence(message.to_string())
}
