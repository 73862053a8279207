//! Route authorization gate.
//!
//! Decides, for a navigation target, whether to render it, redirect
//! elsewhere, or show a loading placeholder while the session is still being
//! resolved. [`decide`] is a pure function of the current inputs; the
//! per-mount state (the fallback timer) lives in [`RouteGuard`].

mod guard;

pub use guard::RouteGuard;

use std::fmt;

use url::Url;

use nutrifit_core::SessionStatus;

/// Base used to parse relative navigation targets.
const ROUTE_BASE: &str = "app://nutrifit/";

/// Query parameter that marks `/auth` as the password-reset form.
const RESET_PARAM: &str = "reset";

/// A navigation target the client knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `/`, the analysis screen.
    Home,
    /// `/profile`
    Profile,
    /// `/auth`; `reset` is set by `?reset=true` (password-reset form).
    Auth { reset: bool },
    /// `/forgot-password`
    ForgotPassword,
    /// `/onboarding`
    Onboarding,
    /// Any other path, kept verbatim.
    NotFound(String),
}

/// Guard class of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    /// Requires a session and completed onboarding.
    Protected,
    /// Sign-in and sign-up screens; only for signed-out users.
    AuthFlow,
    /// The introductory flow; requires a session.
    OnboardingFlow,
}

impl Route {
    /// Parse a path such as `/profile` or `/auth?reset=true`.
    ///
    /// Unknown paths become [`Route::NotFound`]; parsing never fails.
    #[must_use]
    pub fn parse(target: &str) -> Self {
        let parsed = Url::parse(ROUTE_BASE).and_then(|base| base.join(target.trim()));
        let Ok(url) = parsed else {
            return Self::NotFound(target.to_string());
        };

        let path = url.path().trim_end_matches('/');
        match path {
            "" => Self::Home,
            "/profile" => Self::Profile,
            "/auth" => Self::Auth {
                reset: url
                    .query_pairs()
                    .any(|(key, value)| key == RESET_PARAM && value == "true"),
            },
            "/forgot-password" => Self::ForgotPassword,
            "/onboarding" => Self::Onboarding,
            other => Self::NotFound(other.to_string()),
        }
    }

    /// Guard class, or `None` for unguarded routes.
    #[must_use]
    pub const fn class(&self) -> Option<TargetClass> {
        match self {
            Self::Home | Self::Profile => Some(TargetClass::Protected),
            Self::Auth { .. } | Self::ForgotPassword => Some(TargetClass::AuthFlow),
            Self::Onboarding => Some(TargetClass::OnboardingFlow),
            Self::NotFound(_) => None,
        }
    }

    /// Path form of the route.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Profile => "/profile".to_string(),
            Self::Auth { reset: false } => "/auth".to_string(),
            Self::Auth { reset: true } => "/auth?reset=true".to_string(),
            Self::ForgotPassword => "/forgot-password".to_string(),
            Self::Onboarding => "/onboarding".to_string(),
            Self::NotFound(path) => path.clone(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome of evaluating a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Session still resolving; show a placeholder.
    Loading,
    /// Show the requested route.
    Render(Route),
    /// Navigate to another route instead.
    Redirect(Route),
}

impl Decision {
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Evaluate the gate for one route.
///
/// `timed_out` is true once the mount's fallback timer has fired, in which
/// case a still-resolving session counts as signed out.
#[must_use]
pub fn decide(status: &SessionStatus, onboarded: bool, route: &Route, timed_out: bool) -> Decision {
    let Some(class) = route.class() else {
        return Decision::Render(route.clone());
    };

    let signed_in = match status {
        SessionStatus::Resolving if !timed_out => return Decision::Loading,
        SessionStatus::Resolving | SessionStatus::Unauthenticated => false,
        SessionStatus::Authenticated(_) => true,
    };

    match (signed_in, class) {
        (false, TargetClass::Protected | TargetClass::OnboardingFlow) => {
            Decision::Redirect(Route::Auth { reset: false })
        }
        (true, TargetClass::AuthFlow) if *route != (Route::Auth { reset: true }) => {
            Decision::Redirect(Route::Home)
        }
        (true, TargetClass::Protected) if !onboarded => Decision::Redirect(Route::Onboarding),
        (true, TargetClass::OnboardingFlow) if onboarded => Decision::Redirect(Route::Home),
        _ => Decision::Render(route.clone()),
    }
}

#[cfg(test)]
mod tests {
    use nutrifit_core::{Identity, UserId};

    use super::*;

    fn signed_in() -> SessionStatus {
        SessionStatus::Authenticated(Identity::new(UserId::new("u1")))
    }

    fn redirect(route: Route) -> Decision {
        Decision::Redirect(route)
    }

    #[test]
    fn test_route_parse() {
        assert_eq!(Route::parse("/"), Route::Home);
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("/profile/"), Route::Profile);
        assert_eq!(Route::parse("/auth"), Route::Auth { reset: false });
        assert_eq!(Route::parse("/auth?reset=true"), Route::Auth { reset: true });
        assert_eq!(Route::parse("/auth?reset=1"), Route::Auth { reset: false });
        assert_eq!(Route::parse("/forgot-password"), Route::ForgotPassword);
        assert_eq!(Route::parse("/onboarding"), Route::Onboarding);
        assert_eq!(
            Route::parse("/nowhere"),
            Route::NotFound("/nowhere".to_string())
        );
    }

    #[test]
    fn test_route_path_parses_back() {
        for route in [
            Route::Home,
            Route::Profile,
            Route::Auth { reset: true },
            Route::ForgotPassword,
            Route::Onboarding,
        ] {
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn test_resolving_shows_loading() {
        let status = SessionStatus::Resolving;
        assert_eq!(decide(&status, false, &Route::Profile, false), Decision::Loading);
        assert_eq!(
            decide(&status, true, &Route::Auth { reset: false }, false),
            Decision::Loading
        );
    }

    #[test]
    fn test_timed_out_resolving_counts_as_signed_out() {
        let status = SessionStatus::Resolving;
        assert_eq!(
            decide(&status, true, &Route::Profile, true),
            redirect(Route::Auth { reset: false })
        );
        assert_eq!(
            decide(&status, true, &Route::Auth { reset: false }, true),
            Decision::Render(Route::Auth { reset: false })
        );
    }

    #[test]
    fn test_signed_out_protected_redirects_to_auth() {
        let status = SessionStatus::Unauthenticated;
        for route in [Route::Home, Route::Profile, Route::Onboarding] {
            assert_eq!(
                decide(&status, true, &route, false),
                redirect(Route::Auth { reset: false })
            );
        }
        assert_eq!(
            decide(&status, false, &Route::ForgotPassword, false),
            Decision::Render(Route::ForgotPassword)
        );
    }

    #[test]
    fn test_signed_in_auth_flow_redirects_home() {
        assert_eq!(
            decide(&signed_in(), true, &Route::Auth { reset: false }, false),
            redirect(Route::Home)
        );
        assert_eq!(
            decide(&signed_in(), true, &Route::ForgotPassword, false),
            redirect(Route::Home)
        );
    }

    #[test]
    fn test_reset_marker_renders_for_signed_in() {
        let route = Route::Auth { reset: true };
        assert_eq!(
            decide(&signed_in(), true, &route, false),
            Decision::Render(route.clone())
        );
        // Not onboarded makes no difference for the auth flow
        assert_eq!(
            decide(&signed_in(), false, &route, false),
            Decision::Render(route)
        );
    }

    #[test]
    fn test_onboarding_redirects() {
        assert_eq!(
            decide(&signed_in(), false, &Route::Profile, false),
            redirect(Route::Onboarding)
        );
        assert_eq!(
            decide(&signed_in(), false, &Route::Onboarding, false),
            Decision::Render(Route::Onboarding)
        );
        assert_eq!(
            decide(&signed_in(), true, &Route::Onboarding, false),
            redirect(Route::Home)
        );
        assert_eq!(
            decide(&signed_in(), true, &Route::Profile, false),
            Decision::Render(Route::Profile)
        );
    }

    #[test]
    fn test_not_found_always_renders() {
        let route = Route::parse("/missing");
        for status in [SessionStatus::Resolving, SessionStatus::Unauthenticated, signed_in()] {
            assert_eq!(
                decide(&status, false, &route, false),
                Decision::Render(route.clone())
            );
        }
    }
}
