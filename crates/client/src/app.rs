//! Application context.
//!
//! Everything the front end needs, built once at start-up and torn down on
//! exit. Stores are owned here and handed out by reference.

use std::sync::Arc;
use std::time::Duration;

use nutrifit_core::{Identity, SessionStatus};

use crate::analysis::{AnalysisClient, AnalysisCoordinator};
use crate::backend::{BackendClient, BackendIdentityProvider, ProfileStore};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::gate::{Decision, Route, RouteGuard};
use crate::notify::Notifier;
use crate::onboarding::OnboardingStore;
use crate::session::SessionStore;
use crate::storage::FileStorage;

/// Identity provider used by the application.
pub type AppIdentityProvider = BackendIdentityProvider<FileStorage>;

/// Wired-up client state.
pub struct App {
    session: SessionStore<AppIdentityProvider>,
    onboarding: OnboardingStore<FileStorage>,
    analysis: AnalysisCoordinator,
    profiles: ProfileStore,
    auth_timeout: Duration,
}

impl App {
    /// Build every store from `config` and start resolving the session.
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built or a service URL is
    /// unusable.
    pub async fn start(config: &ClientConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let storage = FileStorage::new(&config.state_dir);

        let backend = Arc::new(BackendClient::new(&config.backend, config.request_timeout)?);
        let provider = Arc::new(BackendIdentityProvider::new(
            Arc::clone(&backend),
            storage.clone(),
        ));

        let session = SessionStore::start(provider, Arc::clone(&notifier));
        let onboarding = OnboardingStore::load(storage).await;
        let analysis = AnalysisCoordinator::new(
            AnalysisClient::new(&config.analysis_url, config.request_timeout)?,
            session.subscribe(),
            Arc::clone(&notifier),
        );
        let profiles = ProfileStore::new(backend, notifier);

        tracing::info!(
            state_dir = %config.state_dir.display(),
            backend = %config.backend.url,
            "Client started"
        );

        Ok(Self {
            session,
            onboarding,
            analysis,
            profiles,
            auth_timeout: config.auth_timeout,
        })
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore<AppIdentityProvider> {
        &self.session
    }

    #[must_use]
    pub const fn onboarding(&self) -> &OnboardingStore<FileStorage> {
        &self.onboarding
    }

    #[must_use]
    pub const fn analysis(&self) -> &AnalysisCoordinator {
        &self.analysis
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    /// Mount a route guard for `route`.
    #[must_use]
    pub fn guard(&self, route: Route) -> RouteGuard {
        RouteGuard::mount(
            route,
            self.session.subscribe(),
            self.onboarding.subscribe(),
            self.auth_timeout,
        )
    }

    /// Navigate to `target` and wait for a non-loading decision.
    pub async fn navigate(&self, target: &str) -> Decision {
        let route = Route::parse(target);
        let decision = self.guard(route.clone()).settle().await;
        tracing::debug!(route = %route, ?decision, "Navigation resolved");
        decision
    }

    /// Wait until the session has resolved, or the auth timeout passes.
    ///
    /// Returns the identity if signed in.
    pub async fn resolve_identity(&self) -> Option<Identity> {
        let mut rx = self.session.subscribe();
        let resolved = tokio::time::timeout(
            self.auth_timeout,
            rx.wait_for(|snapshot| !snapshot.status.is_resolving()),
        )
        .await;

        match resolved {
            Ok(Ok(snapshot)) => snapshot.status.identity().cloned(),
            Ok(Err(_)) | Err(_) => {
                tracing::warn!("Session unresolved, continuing signed out");
                None
            }
        }
    }

    /// Current session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Stop background work.
    pub fn shutdown(&self) {
        self.session.shutdown();
        tracing::debug!("Client shut down");
    }
}
