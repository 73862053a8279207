//! Shared helpers for client integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use url::Url;

use nutrifit_client::notify::RecordingNotifier;
use nutrifit_client::session::SessionSnapshot;
use nutrifit_core::{Identity, SessionStatus, UserId};

/// Generous per-request timeout for local mock servers.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Session channel already resolved to `user_id`.
pub fn signed_in_session(user_id: &str) -> (watch::Sender<SessionSnapshot>, watch::Receiver<SessionSnapshot>) {
    watch::channel(SessionSnapshot {
        status: SessionStatus::Authenticated(Identity::new(UserId::new(user_id))),
        seq: 1,
    })
}

pub fn notifier() -> (RecordingNotifier, Arc<RecordingNotifier>) {
    let notifier = RecordingNotifier::new();
    (notifier.clone(), Arc::new(notifier))
}
