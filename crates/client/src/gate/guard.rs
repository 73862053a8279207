//! Per-mount gate state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use nutrifit_core::SessionStatus;

use super::{Decision, Route, decide};
use crate::session::SessionSnapshot;

/// A mounted route watching the session and onboarding flag.
///
/// Mounting while the session is still resolving arms a fallback timer.
/// If the timer fires before the session resolves, the mount treats the
/// session as signed out from then on. The timer fires at most once per
/// mount and never cancels the session lookup itself.
pub struct RouteGuard {
    route: Route,
    session: watch::Receiver<SessionSnapshot>,
    onboarding: watch::Receiver<bool>,
    deadline: Option<Instant>,
    timed_out: bool,
    session_closed: bool,
    onboarding_closed: bool,
}

impl RouteGuard {
    /// Mount `route`. The timer starts now if the session is unresolved.
    #[must_use]
    pub fn mount(
        route: Route,
        session: watch::Receiver<SessionSnapshot>,
        onboarding: watch::Receiver<bool>,
        timeout: Duration,
    ) -> Self {
        let resolving = session.borrow().status.is_resolving();
        let deadline = (resolving && route.class().is_some()).then(|| Instant::now() + timeout);
        if deadline.is_some() {
            tracing::debug!(route = %route, ?timeout, "Route mounted while session resolving");
        }

        Self {
            route,
            session,
            onboarding,
            deadline,
            timed_out: false,
            session_closed: false,
            onboarding_closed: false,
        }
    }

    #[must_use]
    pub const fn route(&self) -> &Route {
        &self.route
    }

    /// Whether the fallback timer has fired for this mount.
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Decision for the current inputs.
    #[must_use]
    pub fn decision(&self) -> Decision {
        let status = self.session.borrow().status.clone();
        let onboarded = *self.onboarding.borrow();
        decide(&status, onboarded, &self.route, self.timed_out)
    }

    /// Wait for an input to change (or the timer to fire) and return the
    /// re-evaluated decision.
    ///
    /// Returns the current decision immediately if nothing can change any
    /// more.
    pub async fn changed(&mut self) -> Decision {
        if self.is_frozen() {
            return self.decision();
        }

        tokio::select! {
            res = self.session.changed(), if !self.session_closed => {
                if res.is_err() {
                    self.session_closed = true;
                } else if !self.session.borrow_and_update().status.is_resolving() {
                    self.deadline = None;
                }
            }
            res = self.onboarding.changed(), if !self.onboarding_closed => {
                if res.is_err() {
                    self.onboarding_closed = true;
                }
            }
            () = sleep_until(self.deadline), if self.deadline.is_some() => {
                self.deadline = None;
                if matches!(self.session.borrow().status, SessionStatus::Resolving) {
                    tracing::warn!(route = %self.route, "Session lookup timed out, treating as signed out");
                    self.timed_out = true;
                }
            }
        }

        self.decision()
    }

    /// Wait until the decision is something other than [`Decision::Loading`].
    ///
    /// Gives back `Loading` if both inputs are gone with no timer armed.
    pub async fn settle(&mut self) -> Decision {
        let mut decision = self.decision();
        while decision.is_loading() && !self.is_frozen() {
            decision = self.changed().await;
        }
        decision
    }

    /// Nothing left that could change the decision.
    const fn is_frozen(&self) -> bool {
        self.session_closed && self.onboarding_closed && self.deadline.is_none()
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use nutrifit_core::{Identity, UserId};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Inputs {
        session: watch::Sender<SessionSnapshot>,
        onboarding: watch::Sender<bool>,
    }

    impl Inputs {
        fn new(onboarded: bool) -> Self {
            let (session, _) = watch::channel(SessionSnapshot::default());
            let (onboarding, _) = watch::channel(onboarded);
            Self { session, onboarding }
        }

        fn mount(&self, route: Route) -> RouteGuard {
            RouteGuard::mount(
                route,
                self.session.subscribe(),
                self.onboarding.subscribe(),
                TIMEOUT,
            )
        }

        fn resolve(&self, status: SessionStatus) {
            self.session.send_modify(|snapshot| {
                snapshot.seq += 1;
                snapshot.status = status;
            });
        }
    }

    fn signed_in() -> SessionStatus {
        SessionStatus::Authenticated(Identity::new(UserId::new("u1")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_redirects_unresolved_protected_route() {
        let inputs = Inputs::new(true);
        let mut guard = inputs.mount(Route::Profile);
        assert_eq!(guard.decision(), Decision::Loading);

        let start = Instant::now();
        let decision = guard.settle().await;

        assert_eq!(decision, Decision::Redirect(Route::Auth { reset: false }));
        assert!(guard.timed_out());
        assert_eq!(start.elapsed(), TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_before_timeout_disarms_timer() {
        let inputs = Inputs::new(true);
        let mut guard = inputs.mount(Route::Profile);

        tokio::time::advance(Duration::from_secs(2)).await;
        inputs.resolve(signed_in());

        assert_eq!(guard.settle().await, Decision::Render(Route::Profile));
        assert!(!guard.timed_out());

        // Signing out later redirects without any timer involvement
        inputs.resolve(SessionStatus::Unauthenticated);
        assert_eq!(
            guard.changed().await,
            Decision::Redirect(Route::Auth { reset: false })
        );
        assert!(!guard.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_most_once_per_mount() {
        let inputs = Inputs::new(true);
        let mut guard = inputs.mount(Route::Home);
        guard.settle().await;
        assert!(guard.timed_out());

        // A late resolution still takes effect
        inputs.resolve(signed_in());
        assert_eq!(guard.changed().await, Decision::Render(Route::Home));

        // Back to resolving: the fired timer keeps counting it as signed out,
        // and no second timer is armed
        inputs.resolve(SessionStatus::Resolving);
        assert_eq!(
            guard.changed().await,
            Decision::Redirect(Route::Auth { reset: false })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_mount_gets_its_own_timer() {
        let inputs = Inputs::new(true);
        let mut first = inputs.mount(Route::Profile);
        first.settle().await;
        assert!(first.timed_out());

        let second = inputs.mount(Route::Profile);
        assert!(!second.timed_out());
        assert_eq!(second.decision(), Decision::Loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_when_resolved_arms_no_timer() {
        let inputs = Inputs::new(false);
        inputs.resolve(signed_in());
        let mut guard = inputs.mount(Route::Profile);

        assert_eq!(guard.decision(), Decision::Redirect(Route::Onboarding));

        inputs.onboarding.send_replace(true);
        assert_eq!(guard.changed().await, Decision::Render(Route::Profile));
        assert!(!guard.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_onboarding_completion_reevaluates() {
        let inputs = Inputs::new(false);
        inputs.resolve(signed_in());
        let mut guard = inputs.mount(Route::Onboarding);
        assert_eq!(guard.decision(), Decision::Render(Route::Onboarding));

        inputs.onboarding.send_replace(true);
        assert_eq!(guard.changed().await, Decision::Redirect(Route::Home));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_returns_loading_when_inputs_close_while_resolving() {
        let inputs = Inputs::new(true);
        inputs.resolve(signed_in());
        let mut guard = inputs.mount(Route::Profile);

        // Back to resolving after mount, so no timer is armed
        inputs.resolve(SessionStatus::Resolving);
        drop(inputs);

        let decision = tokio::time::timeout(TIMEOUT, guard.settle()).await.unwrap();
        assert_eq!(decision, Decision::Loading);
        assert!(!guard.timed_out());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_returns_when_inputs_are_gone() {
        let inputs = Inputs::new(true);
        inputs.resolve(signed_in());
        let mut guard = inputs.mount(Route::Home);
        drop(inputs);

        assert_eq!(guard.changed().await, Decision::Render(Route::Home));
        assert_eq!(guard.changed().await, Decision::Render(Route::Home));
    }
}
