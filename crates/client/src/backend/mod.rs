//! Backend-as-a-service client.
//!
//! The backend exposes three REST surfaces under one base URL:
//!
//! - `/auth/v1` for sessions ([`BackendIdentityProvider`])
//! - `/rest/v1` for profile and allergy rows ([`ProfileStore`])
//! - `/storage/v1` for avatar images ([`ProfileStore::upload_avatar`])
//!
//! Every call carries the public API key in the `apikey` header. The bearer
//! token is the signed-in user's access token when there is one, otherwise
//! the API key itself.

mod auth;
mod profile;

pub use auth::{AUTH_SESSION_KEY, BackendIdentityProvider};
pub use profile::{AVATAR_BUCKET, ProfileError, ProfileStore};

use std::time::Duration;

use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockWriteGuard};
use url::Url;

use crate::config::BackendConfig;

/// Seconds before expiry at which an access token is treated as expired.
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// Access/refresh token pair for a backend session.
///
/// Implements `Debug` manually to redact the tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) when the access token expires.
    pub expires_at: i64,
}

impl AuthTokens {
    /// Whether the access token is expired (or about to be) at `now`.
    #[must_use]
    pub const fn is_expired(&self, now: i64) -> bool {
        now + EXPIRY_LEEWAY_SECS >= self.expires_at
    }
}

impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Attached session tokens plus a counter bumped on every session change.
///
/// Writers that did network I/O between reading and writing compare the
/// generation they started from, so an old answer cannot replace a newer
/// sign-in or sign-out.
#[derive(Debug, Default)]
pub(crate) struct SessionSlot {
    pub(crate) tokens: Option<AuthTokens>,
    pub(crate) generation: u64,
}

impl SessionSlot {
    /// Install `tokens` as a new session generation.
    pub(crate) fn replace(&mut self, tokens: Option<AuthTokens>) {
        self.tokens = tokens;
        self.generation += 1;
    }
}

/// Shared HTTP plumbing for the backend surfaces.
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    anon_key: SecretString,
    session: RwLock<SessionSlot>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut base = config.url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base,
            anon_key: config.anon_key.clone(),
            session: RwLock::new(SessionSlot::default()),
        })
    }

    /// Resolve a path such as `rest/v1/profiles` against the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    /// Start a request with the API key and bearer token attached.
    pub(crate) async fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let bearer = self.session.read().await.tokens.as_ref().map_or_else(
            || self.anon_key.expose_secret().to_owned(),
            |tokens| tokens.access_token.clone(),
        );

        self.http
            .request(method, url)
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    /// Current session tokens, if signed in.
    pub async fn tokens(&self) -> Option<AuthTokens> {
        self.session.read().await.tokens.clone()
    }

    /// Whether a user session is attached.
    pub async fn has_session(&self) -> bool {
        self.session.read().await.tokens.is_some()
    }

    /// Current session generation.
    pub(crate) async fn generation(&self) -> u64 {
        self.session.read().await.generation
    }

    /// Exclusive access to the session slot. Hold it across the persisted
    /// write so memory and storage change together.
    pub(crate) async fn lock_session(&self) -> RwLockWriteGuard<'_, SessionSlot> {
        self.session.write().await
    }

    /// Public URL of an object in a public storage bucket.
    ///
    /// # Errors
    ///
    /// Returns error if the object path does not form a valid URL.
    pub fn public_object_url(&self, bucket: &str, path: &str) -> Result<Url, url::ParseError> {
        self.url(&format!(
            "storage/v1/object/public/{bucket}/{}",
            encode_object_path(path)
        ))
    }
}

/// Percent-encode each segment of a storage object path, keeping the slashes.
pub(crate) fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Error body shapes used across the backend's surfaces.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Parse an error body, tolerating non-JSON text.
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Most descriptive message available, falling back to `body`.
    pub(crate) fn message_or(self, body: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    "Unknown error".to_string()
                } else {
                    body.trim().to_string()
                }
            })
    }
}
