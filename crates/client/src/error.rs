//! Unified error handling with Sentry integration.
//!
//! Each subsystem has its own error enum; [`AppError`] gathers them for
//! callers that drive several subsystems, such as the command line front end.

use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::backend::ProfileError;
use crate::config::ConfigError;
use crate::notify::Notice;
use crate::session::AuthError;
use crate::storage::StorageError;

/// Application-level error type for the NutriFit client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Identity provider operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Nutrition analysis failed.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Profile or allergy operation failed.
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Device-local state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client could not be built or a request failed outright.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Bad input from the user.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Whether this error points at a fault worth reporting, as opposed to an
    /// expected outcome such as a wrong password.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        match self {
            Self::Config(_) | Self::BadRequest(_) => false,
            Self::Storage(_) | Self::Http(_) => true,
            Self::Auth(err) => matches!(err, AuthError::Provider(_)),
            Self::Analysis(err) => matches!(
                err,
                AnalysisError::Transport(_)
                    | AnalysisError::Service { .. }
                    | AnalysisError::MalformedResponse(_)
            ),
            Self::Profile(err) => matches!(
                err,
                ProfileError::Http(_) | ProfileError::Backend { .. } | ProfileError::Decode(_)
            ),
        }
    }

    /// Message safe to show to the user. Internal details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.to_string(),
            Self::Auth(err) => err.user_message(),
            Self::Analysis(err) => err.user_message(),
            Self::Profile(err) => err.user_message(),
            Self::Storage(_) => "Could not access local app data".to_string(),
            Self::Http(_) => "Could not reach the server. Please try again.".to_string(),
            Self::BadRequest(msg) => msg.clone(),
        }
    }

    /// Destructive notice describing this error.
    #[must_use]
    pub fn notice(&self) -> Notice {
        Notice::destructive("Error", self.user_message())
    }

    /// Capture reportable errors to Sentry and log them.
    pub fn report(&self) {
        if self.is_reportable() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Client error"
            );
        } else {
            tracing::debug!(error = %self, "Client error (not reported)");
        }
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("analysis", "Submitted image", Some(&[("image_id", "img:42")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
