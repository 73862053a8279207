//! Session store.
//!
//! Holds the current [`SessionStatus`] and keeps it in step with the identity
//! provider.
//!
//! # Ordering
//!
//! Two sources produce state: the one-off "current session" query issued at
//! start-up, and the provider's stream of session-change notifications. They
//! race. Every state-producing event takes a sequence number from a single
//! monotonic counter when it is issued (the query) or received (a
//! notification), and a snapshot is only replaced by a strictly newer one.
//! Because the store subscribes before it queries, any notification it sees
//! outranks the query, so a slow query can never overwrite a sign-in or
//! sign-out that already happened.

mod error;
mod provider;

pub use error::AuthError;
pub use provider::{
    Credentials, IdentityProvider, ProfileSeed, SESSION_EVENT_CAPACITY, SessionEvent,
    SessionEventKind, SessionEvents,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use nutrifit_core::{Identity, SessionStatus};

use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::notify::{Notice, Notifier};

/// How long an operation waits for its own notification to be applied.
const APPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// A session status tagged with the sequence number that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// 0 until the first event is applied.
    pub seq: u64,
}

/// State shared between the store and its background tasks.
struct Shared {
    state: watch::Sender<SessionSnapshot>,
    next_seq: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            state,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Take the next sequence number.
    fn issue(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Highest sequence number issued so far.
    fn issued(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    /// Wait until a snapshot newer than `floor` has been applied.
    async fn applied_after(&self, floor: u64) {
        let mut rx = self.state.subscribe();
        let applied = tokio::time::timeout(APPLY_TIMEOUT, rx.wait_for(|s| s.seq > floor))
            .await
            .is_ok();
        if !applied {
            tracing::warn!(floor, "Session notification not applied in time");
        }
    }

    /// Apply `status` if `seq` is newer than the current snapshot.
    fn apply(&self, seq: u64, status: SessionStatus, source: &'static str) -> bool {
        let label = status.label();
        let user_id = status.identity().map(|identity| identity.id.clone());

        let applied = self.state.send_if_modified(|snapshot| {
            if seq > snapshot.seq {
                snapshot.status = status;
                snapshot.seq = seq;
                true
            } else {
                false
            }
        });

        if applied {
            tracing::debug!(seq, source, status = label, "Session state updated");
            match &user_id {
                Some(id) => set_sentry_user(id, None),
                None => clear_sentry_user(),
            }
        } else {
            tracing::debug!(seq, source, "Discarded stale session update");
        }
        applied
    }
}

/// Process-wide session state, fed by an [`IdentityProvider`].
///
/// Start one per application with [`SessionStore::start`] and pass it by
/// reference. Dropping the store (or calling [`shutdown`](Self::shutdown))
/// stops listening to the provider.
pub struct SessionStore<P: IdentityProvider> {
    provider: Arc<P>,
    shared: Arc<Shared>,
    notifier: Arc<dyn Notifier>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: IdentityProvider> SessionStore<P> {
    /// Subscribe to the provider, then query the current session once.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(provider: Arc<P>, notifier: Arc<dyn Notifier>) -> Self {
        let shared = Arc::new(Shared::new());

        // Subscribe first so nothing emitted from here on is missed
        let events = provider.subscribe();
        let listener = tokio::spawn(listen(Arc::clone(&provider), Arc::clone(&shared), events));

        let seq = shared.issue();
        let query = tokio::spawn(resolve_current(Arc::clone(&provider), Arc::clone(&shared), seq));

        Self {
            provider,
            shared,
            notifier,
            tasks: Mutex::new(vec![listener, query]),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.state.borrow().status.clone()
    }

    /// Current identity, if authenticated.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.shared.state.borrow().status.identity().cloned()
    }

    /// Receiver that observes every applied snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.state.subscribe()
    }

    /// Sign in with email and password.
    ///
    /// The status changes through the provider's notification; this returns
    /// once that notification has been applied.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; nothing is retried.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let floor = self.shared.issued();
        match self.provider.sign_in(credentials).await {
            Ok(identity) => {
                self.shared.applied_after(floor).await;
                tracing::info!(user_id = %identity.id, "Signed in");
                add_breadcrumb("auth", "Signed in", Some(&[("user_id", identity.id.as_str())]));
                self.notifier
                    .notify(Notice::info("Login successful", "Welcome back to NutriFit!"));
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed");
                self.notifier
                    .notify(Notice::destructive("Login failed", e.user_message()));
                Err(e)
            }
        }
    }

    /// Create an account with a display name.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; nothing is retried.
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<Option<Identity>, AuthError> {
        let floor = self.shared.issued();
        match self.provider.sign_up(credentials, seed).await {
            Ok(identity) => {
                // No session (and no notification) until the email is confirmed
                if identity.is_some() {
                    self.shared.applied_after(floor).await;
                }
                tracing::info!(
                    confirmed = identity.is_some(),
                    "Account created"
                );
                let description = if identity.is_some() {
                    "Welcome to NutriFit!"
                } else {
                    "Check your email to confirm your account, then log in."
                };
                self.notifier
                    .notify(Notice::info("Account created", description));
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-up failed");
                self.notifier
                    .notify(Notice::destructive("Signup failed", e.user_message()));
                Err(e)
            }
        }
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`]; nothing is retried.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let floor = self.shared.issued();
        match self.provider.sign_out().await {
            Ok(()) => {
                self.shared.applied_after(floor).await;
                tracing::info!("Signed out");
                add_breadcrumb("auth", "Signed out", None);
                self.notifier.notify(Notice::info(
                    "Logged out",
                    "You have been logged out successfully",
                ));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-out failed");
                self.notifier
                    .notify(Notice::destructive("Logout failed", e.user_message()));
                Err(e)
            }
        }
    }

    /// Set a new password for the signed-in account, then sign out so the
    /// user logs in again with it.
    ///
    /// # Errors
    ///
    /// Returns the provider's [`AuthError`] from the password update. A
    /// failure of the follow-up sign-out is only logged.
    pub async fn update_password(&self, new_password: &SecretString) -> Result<(), AuthError> {
        if let Err(e) = self.provider.update_password(new_password).await {
            tracing::warn!(error = %e, "Password update failed");
            self.notifier
                .notify(Notice::destructive("Error", e.user_message()));
            return Err(e);
        }

        tracing::info!("Password updated");
        self.notifier.notify(Notice::info(
            "Password Updated",
            "Your password has been updated successfully. Please log in with your new password.",
        ));

        let floor = self.shared.issued();
        match self.provider.sign_out().await {
            Ok(()) => self.shared.applied_after(floor).await,
            Err(e) => tracing::warn!(error = %e, "Sign-out after password update failed"),
        }
        Ok(())
    }

    /// Stop listening to the provider. The last status stays readable.
    pub fn shutdown(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

impl<P: IdentityProvider> Drop for SessionStore<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Apply provider notifications in the order they arrive.
async fn listen<P: IdentityProvider>(
    provider: Arc<P>,
    shared: Arc<Shared>,
    mut events: broadcast::Receiver<SessionEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let seq = shared.issue();
                tracing::debug!(seq, kind = ?event.kind, "Session notification received");
                shared.apply(seq, SessionStatus::from_identity(event.identity), "notification");
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Events were dropped; the provider's current answer replaces them
                tracing::warn!(missed, "Session notifications lagged, re-querying session");
                let seq = shared.issue();
                tokio::spawn(resolve_current(
                    Arc::clone(&provider),
                    Arc::clone(&shared),
                    seq,
                ));
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Session notification stream closed");
                break;
            }
        }
    }
}

/// Query the provider's current session and apply it under `seq`.
async fn resolve_current<P: IdentityProvider>(provider: Arc<P>, shared: Arc<Shared>, seq: u64) {
    let status = match provider.current_session().await {
        Ok(identity) => SessionStatus::from_identity(identity),
        Err(e) => {
            tracing::warn!(error = %e, "Session lookup failed, treating as signed out");
            SessionStatus::Unauthenticated
        }
    };
    shared.apply(seq, status, "query");
}
