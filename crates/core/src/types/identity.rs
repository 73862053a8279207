//! Authenticated identity and session status.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// The identity attached to a live session.
///
/// Replaced wholesale on every session-change notification; never patched
/// field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend-issued user id.
    pub id: UserId,
    /// Email the account was registered with, if the provider reports it.
    pub email: Option<String>,
    /// Display name from the sign-up metadata or profile.
    pub display_name: Option<String>,
    /// Avatar URL.
    pub avatar_ref: Option<String>,
}

impl Identity {
    /// Identity with only an id, as produced by minimal provider payloads.
    #[must_use]
    pub const fn new(id: UserId) -> Self {
        Self {
            id,
            email: None,
            display_name: None,
            avatar_ref: None,
        }
    }

    /// Name to greet the user with: display name, else the email's local part.
    #[must_use]
    pub fn greeting_name(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .filter(|local| !local.is_empty())
            })
    }
}

/// Where the client stands with respect to authentication.
///
/// Exactly one variant holds at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// The provider has not answered yet.
    #[default]
    Resolving,
    /// A session is active.
    Authenticated(Identity),
    /// No session, or the session ended.
    Unauthenticated,
}

impl SessionStatus {
    /// Build a status from an optional identity (the shape providers return).
    #[must_use]
    pub fn from_identity(identity: Option<Identity>) -> Self {
        identity.map_or(Self::Unauthenticated, Self::Authenticated)
    }

    /// The identity if authenticated.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Resolving | Self::Unauthenticated => None,
        }
    }

    #[must_use]
    pub const fn is_resolving(&self) -> bool {
        matches!(self, Self::Resolving)
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Resolving => "resolving",
            Self::Authenticated(_) => "authenticated",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}
