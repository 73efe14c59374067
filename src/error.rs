// Error handling module
// Defines the failure taxonomy shared by every authentication stage

use thiserror::Error;

/// Errors that can occur while obtaining or persisting a token
#[derive(Error, Debug)]
pub enum AuthError {
    /// Static secrets are missing or unusable; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network, DNS or TLS failure talking to the remote API
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Login was rejected or answered with an unusable body
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Refresh was rejected or answered with an unusable body
    #[error("Token refresh failed: {0}")]
    RefreshFailure(String),

    /// Reading or writing persisted token material failed
    #[error("Credential store error: {0}")]
    Store(String),

    /// Validation, refresh and login all failed in one pass
    #[error("All authentication stages failed (refresh: {refresh}; login: {login})")]
    LifecycleExhausted {
        refresh: Box<AuthError>,
        login: Box<AuthError>,
    },
}

impl AuthError {
    /// True for the fatal class that no amount of re-invoking will fix
    pub fn is_configuration(&self) -> bool {
        match self {
            AuthError::Configuration(_) => true,
            AuthError::LifecycleExhausted { login, .. } => login.is_configuration(),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Store(format!("{:#}", err))
    }
}

/// Result type alias for authentication operations
pub type Result<T> = std::result::Result<T, AuthError>;
