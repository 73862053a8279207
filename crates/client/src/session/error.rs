//! Authentication error types.

use thiserror::Error;

/// Errors returned by identity provider operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong email/password, or the account does not exist.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The provider could not be reached.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The provider answered with an error of its own.
    #[error("provider error: {0}")]
    Provider(String),
}

impl AuthError {
    /// Classify a transport-level failure.
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::NetworkUnavailable(err.to_string())
        } else {
            Self::Provider(err.to_string())
        }
    }

    /// Text suitable for showing to the person at the keyboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::NetworkUnavailable(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            Self::Provider(message) => message.clone(),
        }
    }
}
