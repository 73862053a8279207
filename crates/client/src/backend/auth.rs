//! REST identity provider over the backend's `/auth/v1` surface.
//!
//! Sessions are persisted in device storage so a restarted client picks up
//! where it left off. Expired access tokens are refreshed on lookup.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::instrument;

use nutrifit_core::{Identity, UserId};

use super::{ApiErrorBody, AuthTokens, BackendClient};
use crate::session::{
    AuthError, Credentials, IdentityProvider, ProfileSeed, SessionEvent, SessionEventKind,
    SessionEvents,
};
use crate::storage::KeyValueStorage;

/// Storage key for the persisted token pair.
pub const AUTH_SESSION_KEY: &str = "nutrifit_auth_session";

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
}

#[derive(Serialize)]
struct PasswordUpdate<'a> {
    password: &'a str,
}

/// Session issued by the token and sign-up endpoints.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Token lifetime in seconds.
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserPayload,
}

impl TokenResponse {
    fn into_parts(self) -> (AuthTokens, Identity) {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| chrono::Utc::now().timestamp() + self.expires_in);
        let tokens = AuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        };
        (tokens, self.user.into_identity())
    }
}

/// Sign-up answers with a session, or with only the user when the email
/// must be confirmed first.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(Box<TokenResponse>),
    Pending(UserPayload),
}

#[derive(Deserialize)]
struct UserPayload {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Default, Deserialize)]
struct UserMetadata {
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl UserPayload {
    fn into_identity(self) -> Identity {
        let UserMetadata {
            full_name,
            name,
            avatar_url,
        } = self.user_metadata;
        Identity {
            id: UserId::new(self.id),
            email: self.email.filter(|email| !email.is_empty()),
            display_name: full_name.or(name).filter(|name| !name.trim().is_empty()),
            avatar_ref: avatar_url,
        }
    }
}

/// [`IdentityProvider`] backed by the backend's auth REST API.
pub struct BackendIdentityProvider<S> {
    backend: Arc<BackendClient>,
    storage: S,
    events: SessionEvents,
}

impl<S: KeyValueStorage> BackendIdentityProvider<S> {
    #[must_use]
    pub fn new(backend: Arc<BackendClient>, storage: S) -> Self {
        Self {
            backend,
            storage,
            events: SessionEvents::new(),
        }
    }

    /// Tokens in memory, else the ones persisted by an earlier run.
    async fn load_tokens(&self) -> Option<AuthTokens> {
        let mut slot = self.backend.lock_session().await;
        if slot.tokens.is_some() {
            return slot.tokens.clone();
        }

        let raw = match self.storage.get(AUTH_SESSION_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "Saved session unreadable");
                return None;
            }
        };

        match serde_json::from_str::<AuthTokens>(&raw) {
            Ok(tokens) => {
                // Same session, now in memory; not a new generation
                slot.tokens = Some(tokens.clone());
                Some(tokens)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Saved session corrupt, discarding");
                self.remove_saved().await;
                None
            }
        }
    }

    /// Attach and persist `tokens`.
    ///
    /// With `since`, the write only happens if no other session change
    /// landed after that generation. Returns whether it was written.
    async fn store_session(&self, tokens: AuthTokens, since: Option<u64>) -> bool {
        let mut slot = self.backend.lock_session().await;
        if since.is_some_and(|generation| generation != slot.generation) {
            tracing::debug!("Session changed meanwhile, dropping refreshed tokens");
            return false;
        }

        match serde_json::to_string(&tokens) {
            Ok(raw) => {
                if let Err(e) = self.storage.set(AUTH_SESSION_KEY, &raw).await {
                    tracing::warn!(error = %e, "Failed to persist session");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode session"),
        }
        slot.replace(Some(tokens));
        true
    }

    /// Detach and delete the saved session, with the same `since` rule as
    /// [`Self::store_session`].
    async fn forget_session(&self, since: Option<u64>) {
        let mut slot = self.backend.lock_session().await;
        if since.is_some_and(|generation| generation != slot.generation) {
            tracing::debug!("Session changed meanwhile, keeping it");
            return;
        }

        self.remove_saved().await;
        slot.replace(None);
    }

    async fn remove_saved(&self) {
        if let Err(e) = self.storage.remove(AUTH_SESSION_KEY).await {
            tracing::warn!(error = %e, "Failed to clear saved session");
        }
    }

    /// Exchange the refresh token for a new session.
    async fn refresh(
        &self,
        tokens: &AuthTokens,
        since: u64,
    ) -> Result<Option<Identity>, AuthError> {
        let url = self.token_url("refresh_token")?;
        let response = self
            .backend
            .request(Method::POST, url)
            .await
            .json(&RefreshGrant {
                refresh_token: &tokens.refresh_token,
            })
            .send()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;
        let status = response.status();

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            tracing::info!("Refresh token rejected, session ended");
            self.forget_session(Some(since)).await;
            return Ok(None);
        }

        let (tokens, identity) = decode_session(response).await?;
        if self.store_session(tokens, Some(since)).await {
            self.events.emit(SessionEvent {
                kind: SessionEventKind::TokenRefreshed,
                identity: Some(identity.clone()),
            });
        }
        Ok(Some(identity))
    }

    /// Fetch the user behind the current access token.
    async fn fetch_user(&self, since: u64) -> Result<Option<Identity>, AuthError> {
        let url = self.auth_url("auth/v1/user")?;
        let response = self
            .backend
            .request(Method::GET, url)
            .await
            .send()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::info!("Access token rejected, session ended");
            self.forget_session(Some(since)).await;
            return Ok(None);
        }

        let user: UserPayload = decode(response).await?;
        Ok(Some(user.into_identity()))
    }

    fn auth_url(&self, path: &str) -> Result<url::Url, AuthError> {
        self.backend
            .url(path)
            .map_err(|e| AuthError::Provider(format!("invalid auth URL: {e}")))
    }

    fn token_url(&self, grant_type: &str) -> Result<url::Url, AuthError> {
        let mut url = self.auth_url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        Ok(url)
    }
}

impl<S: KeyValueStorage> IdentityProvider for BackendIdentityProvider<S> {
    #[instrument(skip(self))]
    async fn current_session(&self) -> Result<Option<Identity>, AuthError> {
        let since = self.backend.generation().await;
        let Some(tokens) = self.load_tokens().await else {
            tracing::debug!("No saved session");
            return Ok(None);
        };

        if tokens.is_expired(chrono::Utc::now().timestamp()) {
            tracing::debug!("Access token expired, refreshing");
            return self.refresh(&tokens, since).await;
        }

        self.fetch_user(since).await
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError> {
        let url = self.token_url("password")?;
        let response = self
            .backend
            .request(Method::POST, url)
            .await
            .json(&PasswordGrant {
                email: credentials.email.as_str(),
                password: credentials.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;

        let (tokens, identity) = decode_session(response).await?;
        self.store_session(tokens, None).await;
        self.events.emit(SessionEvent::signed_in(identity.clone()));
        Ok(identity)
    }

    #[instrument(skip(self, credentials, seed), fields(email = %credentials.email))]
    async fn sign_up(
        &self,
        credentials: &Credentials,
        seed: &ProfileSeed,
    ) -> Result<Option<Identity>, AuthError> {
        let url = self.auth_url("auth/v1/signup")?;
        let response = self
            .backend
            .request(Method::POST, url)
            .await
            .json(&SignUpRequest {
                email: credentials.email.as_str(),
                password: credentials.password.expose_secret(),
                data: SignUpMetadata {
                    full_name: seed.full_name.trim(),
                },
            })
            .send()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;

        match decode::<SignUpResponse>(response).await? {
            SignUpResponse::Session(session) => {
                let (tokens, identity) = session.into_parts();
                self.store_session(tokens, None).await;
                self.events.emit(SessionEvent::signed_in(identity.clone()));
                Ok(Some(identity))
            }
            SignUpResponse::Pending(user) => {
                tracing::info!(user_id = %user.id, "Account awaiting email confirmation");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), AuthError> {
        if self.backend.has_session().await {
            // Revocation is best effort; the local session ends regardless
            match self.auth_url("auth/v1/logout") {
                Ok(url) => {
                    let result = self.backend.request(Method::POST, url).await.send().await;
                    match result {
                        Ok(response) if !response.status().is_success() => {
                            tracing::warn!(status = %response.status(), "Remote sign-out rejected");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Remote sign-out failed"),
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Remote sign-out skipped"),
            }
        }

        self.forget_session(None).await;
        self.events.emit(SessionEvent::signed_out());
        Ok(())
    }

    #[instrument(skip(self, new_password))]
    async fn update_password(&self, new_password: &SecretString) -> Result<(), AuthError> {
        if !self.backend.has_session().await {
            return Err(AuthError::Provider("Auth session missing".to_string()));
        }

        let url = self.auth_url("auth/v1/user")?;
        let response = self
            .backend
            .request(Method::PUT, url)
            .await
            .json(&PasswordUpdate {
                password: new_password.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| AuthError::from_transport(&e))?;

        let user: UserPayload = decode(response).await?;
        self.events.emit(SessionEvent {
            kind: SessionEventKind::UserUpdated,
            identity: Some(user.into_identity()),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Decode a token/sign-in response into tokens and identity.
async fn decode_session(response: reqwest::Response) -> Result<(AuthTokens, Identity), AuthError> {
    let session: TokenResponse = decode(response).await?;
    Ok(session.into_parts())
}

/// Check the status and decode a JSON body, classifying failures.
async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AuthError::from_transport(&e))?;

    if !status.is_success() {
        return Err(classify_failure(status, &body));
    }

    serde_json::from_str(&body)
        .map_err(|e| AuthError::Provider(format!("unexpected auth response: {e}")))
}

fn classify_failure(status: StatusCode, body: &str) -> AuthError {
    let parsed = ApiErrorBody::parse(body);
    let credentials_rejected = status == StatusCode::UNAUTHORIZED
        || parsed.error_code.as_deref() == Some("invalid_credentials");
    let message = parsed.message_or(body);

    if credentials_rejected
        || (status == StatusCode::BAD_REQUEST
            && message.to_ascii_lowercase().contains("invalid login credentials"))
    {
        AuthError::InvalidCredentials
    } else {
        tracing::debug!(status = %status, message = %message, "Auth request rejected");
        AuthError::Provider(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_invalid_login() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert!(matches!(
            classify_failure(StatusCode::BAD_REQUEST, body),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, ""),
            AuthError::InvalidCredentials
        ));
    }

    #[test]
    fn test_classify_other_failures_keep_message() {
        let body = r#"{"code":400,"error_code":"email_not_confirmed","msg":"Email not confirmed"}"#;
        match classify_failure(StatusCode::BAD_REQUEST, body) {
            AuthError::Provider(message) => assert_eq!(message, "Email not confirmed"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_user_payload_metadata_mapping() {
        let user: UserPayload = serde_json::from_str(
            r#"{"id":"u1","email":"sam@example.com","user_metadata":{"name":"Sam","avatar_url":"https://cdn/a.png"}}"#,
        )
        .unwrap();
        let identity = user.into_identity();
        assert_eq!(identity.id.as_str(), "u1");
        assert_eq!(identity.display_name.as_deref(), Some("Sam"));
        assert_eq!(identity.avatar_ref.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn test_sign_up_response_shapes() {
        let pending: SignUpResponse =
            serde_json::from_str(r#"{"id":"u1","email":"sam@example.com"}"#).unwrap();
        assert!(matches!(pending, SignUpResponse::Pending(_)));

        let session: SignUpResponse = serde_json::from_str(
            r#"{"access_token":"a","refresh_token":"r","expires_in":3600,"user":{"id":"u1"}}"#,
        )
        .unwrap();
        assert!(matches!(session, SignUpResponse::Session(_)));
    }
}
