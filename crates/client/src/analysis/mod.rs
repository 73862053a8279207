//! Analysis request coordinator.
//!
//! Turns an image plus the signed-in user into one request to the analysis
//! service and publishes the outcome as an [`AnalysisState`] snapshot.

mod client;
mod image;

pub use client::{AnalysisClient, AnalysisRequest};
pub use image::ImageHandle;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use nutrifit_core::NutritionResult;

use crate::error::add_breadcrumb;
use crate::notify::{Notice, Notifier};
use crate::session::SessionSnapshot;

/// Errors that can occur when analysing an image.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No signed-in user; nothing was sent.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The request did not complete.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-2xx status.
    #[error("service error: {status} - {message}")]
    Service { status: u16, message: String },

    /// The body did not match the nutrition result shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The configured service URL is unusable.
    #[error("invalid service URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl AnalysisError {
    /// Text suitable for showing to the person at the keyboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "Please log in to analyze food images".to_string(),
            Self::Transport(_) => {
                "Could not reach the analysis service. Please try again.".to_string()
            }
            Self::Service { .. } | Self::MalformedResponse(_) | Self::InvalidUrl(_) => {
                "Failed to analyze image. Please try again.".to_string()
            }
        }
    }
}

/// Observable coordinator state.
#[derive(Debug, Clone, Default)]
pub struct AnalysisState {
    /// Requests currently outstanding.
    pub in_flight: usize,
    /// Last successful result.
    pub result: Option<Arc<NutritionResult>>,
    /// Image the last successful result belongs to.
    pub image_id: Option<String>,
}

impl AnalysisState {
    #[must_use]
    pub const fn is_analyzing(&self) -> bool {
        self.in_flight > 0
    }
}

/// Coordinates analysis requests for the signed-in user.
pub struct AnalysisCoordinator {
    client: AnalysisClient,
    session: watch::Receiver<SessionSnapshot>,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<AnalysisState>,
}

impl AnalysisCoordinator {
    #[must_use]
    pub fn new(
        client: AnalysisClient,
        session: watch::Receiver<SessionSnapshot>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _) = watch::channel(AnalysisState::default());
        Self {
            client,
            session,
            notifier,
            state,
        }
    }

    /// Analyse `image` on behalf of the signed-in user.
    ///
    /// The request counts towards [`AnalysisState::is_analyzing`] until it
    /// finishes or this future is dropped. A failure leaves the previous
    /// result in place. Nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns `NotAuthenticated` without touching the network if no user is
    /// signed in, otherwise whatever the service call failed with.
    pub async fn submit(&self, image: ImageHandle) -> Result<NutritionResult, AnalysisError> {
        let owner = self.session.borrow().status.identity().map(|identity| identity.id.clone());
        let Some(owner_id) = owner else {
            tracing::debug!("Analysis requested without a session");
            self.notifier.notify(Notice::destructive(
                "Authentication required",
                AnalysisError::NotAuthenticated.user_message(),
            ));
            return Err(AnalysisError::NotAuthenticated);
        };

        let image_id = image.id.clone();
        add_breadcrumb("analysis", "Submitted image", Some(&[("image_id", image_id.as_str())]));

        let _in_flight = InFlight::enter(&self.state);
        let outcome = self
            .client
            .analyze(AnalysisRequest { image, owner_id })
            .await;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    image_id = %image_id,
                    total_calories = result.total_calories,
                    items = result.food_items.len(),
                    "Analysis complete"
                );
                let shared = Arc::new(result.clone());
                self.state.send_modify(|state| {
                    state.result = Some(shared);
                    state.image_id = Some(image_id);
                });
                self.notifier.notify(Notice::info(
                    "Analysis complete",
                    "Your food has been analyzed successfully!",
                ));
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(image_id = %image_id, error = %e, "Analysis failed");
                self.notifier
                    .notify(Notice::destructive("Analysis failed", e.user_message()));
                Err(e)
            }
        }
    }

    /// Clear the last result and its image reference.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.result = None;
            state.image_id = None;
        });
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_analyzing(&self) -> bool {
        self.state.borrow().is_analyzing()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }
}

/// Counts one outstanding request for as long as it lives.
struct InFlight<'a> {
    state: &'a watch::Sender<AnalysisState>,
}

impl<'a> InFlight<'a> {
    fn enter(state: &'a watch::Sender<AnalysisState>) -> Self {
        state.send_modify(|state| state.in_flight += 1);
        Self { state }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state
            .send_modify(|state| state.in_flight = state.in_flight.saturating_sub(1));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use url::Url;

    use super::*;
    use crate::notify::RecordingNotifier;

    fn coordinator(
        snapshot: SessionSnapshot,
    ) -> (AnalysisCoordinator, watch::Sender<SessionSnapshot>, RecordingNotifier) {
        // Nothing listens here; any request that goes out fails with Transport
        let base = Url::parse("http://127.0.0.1:9/").unwrap();
        let client = AnalysisClient::new(&base, Duration::from_secs(1)).unwrap();
        let (session, rx) = watch::channel(snapshot);
        let notifier = RecordingNotifier::new();
        let coordinator = AnalysisCoordinator::new(client, rx, Arc::new(notifier.clone()));
        (coordinator, session, notifier)
    }

    #[tokio::test]
    async fn test_submit_without_session_fails_fast() {
        let (coordinator, _session, notifier) = coordinator(SessionSnapshot::default());

        let err = coordinator
            .submit(ImageHandle::new("toast.jpg", vec![1, 2, 3]))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::NotAuthenticated));
        assert!(!coordinator.is_analyzing());
        assert!(coordinator.state().result.is_none());
        assert_eq!(notifier.titles(), ["Authentication required"]);
    }

    #[test]
    fn test_in_flight_guard_counts_and_releases() {
        let (state, rx) = watch::channel(AnalysisState::default());
        {
            let _a = InFlight::enter(&state);
            let _b = InFlight::enter(&state);
            assert_eq!(rx.borrow().in_flight, 2);
            assert!(rx.borrow().is_analyzing());
        }
        assert!(!rx.borrow().is_analyzing());
    }

    #[test]
    fn test_user_messages_hide_details() {
        let err = AnalysisError::Service {
            status: 502,
            message: "upstream model crashed".to_string(),
        };
        assert!(!err.user_message().contains("upstream"));
        assert_eq!(err.to_string(), "service error: 502 - upstream model crashed");
    }
}
