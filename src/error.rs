//! Error types for nudgebot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Channel directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Slack error: {0}")]
    Slack(#[from] SlackError),
}

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Missing environment credentials. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Missing required environment variable: {name}. export {name}={hint}")]
    MissingEnvVar { name: String, hint: String },
}

/// Channel directory errors. Fatal at startup — the directory is required
/// for logging and welcome-message matching.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to list channels: {0}")]
    ListFailed(String),
}

/// Slack Web API / Socket Mode errors.
///
/// Fatal during startup (auth.test); logged and swallowed during event
/// handling and tick delivery.
#[derive(Debug, thiserror::Error)]
pub enum SlackError {
    #[error("{method} request failed: {reason}")]
    Http { method: String, reason: String },

    #[error("{method} returned error: {error}")]
    Api { method: String, error: String },

    #[error("Socket Mode error: {0}")]
    Socket(String),
}

impl SlackError {
    /// Wrap a reqwest transport failure for a given API method.
    pub fn http(method: &str, err: impl std::fmt::Display) -> Self {
        Self::Http {
            method: method.to_string(),
            reason: err.to_string(),
        }
    }

    /// Wrap a Slack `"ok": false` response for a given API method.
    pub fn api(method: &str, error: impl Into<String>) -> Self {
        Self::Api {
            method: method.to_string(),
            error: error.into(),
        }
    }
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
