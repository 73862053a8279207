//! Identity provider seam.
//!
//! The client does not authenticate anyone itself. An [`IdentityProvider`]
//! owns sessions and announces every change through a broadcast of
//! [`SessionEvent`]s; the session store only listens.

use std::future::Future;
use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::broadcast;

use nutrifit_core::{Email, Identity};

use super::error::AuthError;

/// Capacity of the session event channel. A subscriber that falls further
/// behind than this re-queries the current session.
pub const SESSION_EVENT_CAPACITY: usize = 32;

/// Email/password pair for sign-in and sign-up.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new(email: Email, password: impl Into<String>) -> Self {
        Self {
            email,
            password: SecretString::from(password.into()),
        }
    }
}

/// Profile data attached to a new account at sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSeed {
    pub full_name: String,
}

/// Why the provider emitted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    /// The session was opened from a password recovery link.
    PasswordRecovery,
}

/// A session-change notification. `identity` is the full replacement state:
/// `None` means no session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub identity: Option<Identity>,
}

impl SessionEvent {
    #[must_use]
    pub const fn signed_in(identity: Identity) -> Self {
        Self {
            kind: SessionEventKind::SignedIn,
            identity: Some(identity),
        }
    }

    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            kind: SessionEventKind::SignedOut,
            identity: None,
        }
    }
}

/// Operations the client consumes from the identity provider.
pub trait IdentityProvider: Send + Sync + 'static {
    /// Look up the session currently held by the provider, if any.
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;

    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send;

    /// Create an account. Returns `None` when the provider requires the
    /// email to be confirmed before a session exists.
    fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send;

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Change the password of the signed-in account.
    fn update_password(
        &self,
        new_password: &SecretString,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Register for session-change notifications. Events emitted after this
    /// call returns are delivered in emission order.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

impl<P: IdentityProvider> IdentityProvider for Arc<P> {
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send {
        (**self).current_session()
    }

    fn sign_in(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Identity, AuthError>> + Send {
        (**self).sign_in(credentials)
    }

    fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> impl Future<Output = Result<Option<Identity>, AuthError>> + Send {
        (**self).sign_up(credentials, seed)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), AuthError>> + Send {
        (**self).sign_out()
    }

    fn update_password(
        &self,
        new_password: &SecretString,
    ) -> impl Future<Output = Result<(), AuthError>> + Send {
        (**self).update_password(new_password)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        (**self).subscribe()
    }
}

/// Broadcast side of the session event stream, for provider implementations.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { tx }
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(kind = ?event.kind, "Session event emitted");
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
