//! Profile, allergy and avatar operations over the backend's row and storage
//! APIs.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::instrument;

use nutrifit_core::{Allergy, AllergyId, NewAllergy, Profile, Severity, UserId};

use super::{ApiErrorBody, BackendClient, encode_object_path};
use crate::analysis::ImageHandle;
use crate::notify::{Notice, Notifier};

/// Storage bucket holding profile pictures.
pub const AVATAR_BUCKET: &str = "avatars";

/// Errors that can occur in profile operations.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No backend session is attached.
    #[error("not authenticated")]
    NotAuthenticated,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned an error response.
    #[error("API error: {status} - {message}")]
    Backend { status: u16, message: String },

    /// Failed to decode a response.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Rejected before sending.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Row not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ProfileError {
    /// Text suitable for showing to the person at the keyboard.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotAuthenticated => "You must be logged in to do that".to_string(),
            Self::Http(_) => "Could not reach the server. Please try again.".to_string(),
            Self::Backend { message, .. } => message.clone(),
            Self::Decode(_) => "Unexpected response from the server".to_string(),
            Self::InvalidInput(message) => message.clone(),
            Self::NotFound(what) => format!("{what} not found"),
        }
    }
}

#[derive(Serialize)]
struct FullNameUpdate<'a> {
    full_name: &'a str,
}

#[derive(Serialize)]
struct AvatarUpdate<'a> {
    avatar_url: &'a str,
}

/// Reads and edits the signed-in user's profile data.
pub struct ProfileStore {
    backend: Arc<BackendClient>,
    notifier: Arc<dyn Notifier>,
}

impl ProfileStore {
    #[must_use]
    pub fn new(backend: Arc<BackendClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self { backend, notifier }
    }

    /// Load a profile row.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no row exists for `user`.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn profile(&self, user: &UserId) -> Result<Profile, ProfileError> {
        let result = self
            .rows::<Profile>(Method::GET, "profiles", &[("id", user.as_str())], None::<&()>)
            .await
            .and_then(|rows| first_row(rows, "Profile"));
        self.notify_failure(&result, "Failed to load profile");
        result
    }

    /// Change the display name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank name, otherwise any backend error.
    #[instrument(skip(self, full_name), fields(user_id = %user))]
    pub async fn update_full_name(
        &self,
        user: &UserId,
        full_name: &str,
    ) -> Result<Profile, ProfileError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            let err = ProfileError::InvalidInput("Please enter your name".to_string());
            self.notifier
                .notify(Notice::destructive("Error", err.user_message()));
            return Err(err);
        }

        let result = self
            .rows::<Profile>(
                Method::PATCH,
                "profiles",
                &[("id", user.as_str())],
                Some(&FullNameUpdate { full_name }),
            )
            .await
            .and_then(|rows| first_row(rows, "Profile"));

        if result.is_ok() {
            tracing::info!("Profile name updated");
            self.notifier
                .notify(Notice::info("Success", "Profile updated successfully"));
        }
        self.notify_failure(&result, "Failed to update profile");
        result
    }

    /// List the user's allergies, newest first.
    ///
    /// # Errors
    ///
    /// Returns any backend error.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn allergies(&self, user: &UserId) -> Result<Vec<Allergy>, ProfileError> {
        let result = self
            .rows::<Allergy>(
                Method::GET,
                "allergies",
                &[("user_id", user.as_str())],
                None::<&()>,
            )
            .await
            .map(|mut rows| {
                rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                rows
            });
        self.notify_failure(&result, "Failed to load allergies");
        result
    }

    /// Record a new allergy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a blank substance, otherwise any backend
    /// error.
    #[instrument(skip(self, substance), fields(user_id = %user, severity = %severity))]
    pub async fn add_allergy(
        &self,
        user: &UserId,
        substance: &str,
        severity: Severity,
    ) -> Result<Allergy, ProfileError> {
        let substance = substance.trim();
        if substance.is_empty() {
            let err = ProfileError::InvalidInput("Please enter an allergy name".to_string());
            self.notifier
                .notify(Notice::destructive("Error", err.user_message()));
            return Err(err);
        }

        let row = NewAllergy {
            user_id: user.clone(),
            substance: substance.to_string(),
            severity,
        };
        let result = self
            .rows::<Allergy>(Method::POST, "allergies", &[], Some(&row))
            .await
            .and_then(|rows| first_row(rows, "Allergy"));

        if let Ok(allergy) = &result {
            tracing::info!(allergy_id = %allergy.id, "Allergy added");
            self.notifier
                .notify(Notice::info("Success", "Allergy added successfully"));
        }
        self.notify_failure(&result, "Failed to add allergy");
        result
    }

    /// Delete an allergy by id.
    ///
    /// # Errors
    ///
    /// Returns any backend error.
    #[instrument(skip(self), fields(allergy_id = %id))]
    pub async fn remove_allergy(&self, id: &AllergyId) -> Result<(), ProfileError> {
        let result = self
            .rows::<Allergy>(Method::DELETE, "allergies", &[("id", id.as_str())], None::<&()>)
            .await
            .map(|_| ());

        if result.is_ok() {
            tracing::info!("Allergy removed");
            self.notifier
                .notify(Notice::info("Success", "Allergy removed successfully"));
        }
        self.notify_failure(&result, "Failed to remove allergy");
        result
    }

    /// Upload a profile picture and point the profile at it.
    ///
    /// The object lives at `avatars/{user_id}/avatar.{ext}` and is replaced
    /// on every upload.
    ///
    /// # Errors
    ///
    /// Returns any storage or backend error.
    #[instrument(skip(self, image), fields(user_id = %user, size = image.bytes.len()))]
    pub async fn upload_avatar(
        &self,
        user: &UserId,
        image: ImageHandle,
    ) -> Result<Profile, ProfileError> {
        let result = self.upload_avatar_inner(user, image).await;

        match &result {
            Ok(profile) => {
                tracing::info!(avatar_url = ?profile.avatar_url, "Avatar updated");
                self.notifier
                    .notify(Notice::info("Success", "Avatar uploaded successfully"));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Avatar upload failed");
                self.notifier
                    .notify(Notice::destructive("Error", e.user_message()));
            }
        }
        result
    }

    async fn upload_avatar_inner(
        &self,
        user: &UserId,
        image: ImageHandle,
    ) -> Result<Profile, ProfileError> {
        self.require_session().await?;

        let ext = image.extension().unwrap_or_else(|| "png".to_string());
        let object_path = format!("{user}/avatar.{ext}");
        let url = self.url(&format!(
            "storage/v1/object/{AVATAR_BUCKET}/{}",
            encode_object_path(&object_path)
        ))?;

        let response = self
            .backend
            .request(Method::POST, url)
            .await
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, image.content_type.as_str())
            .body(image.bytes)
            .send()
            .await?;
        check_status(response).await?;

        let public_url = self
            .backend
            .public_object_url(AVATAR_BUCKET, &object_path)
            .map_err(|e| ProfileError::Decode(e.to_string()))?;

        self.rows::<Profile>(
            Method::PATCH,
            "profiles",
            &[("id", user.as_str())],
            Some(&AvatarUpdate {
                avatar_url: public_url.as_str(),
            }),
        )
        .await
        .and_then(|rows| first_row(rows, "Profile"))
    }

    /// Issue a row API request and decode the returned rows.
    ///
    /// Filters become PostgREST `column=eq.value` query parameters.
    async fn rows<T: DeserializeOwned>(
        &self,
        method: Method,
        table: &str,
        filters: &[(&str, &str)],
        body: Option<&impl Serialize>,
    ) -> Result<Vec<T>, ProfileError> {
        self.require_session().await?;

        let mut url = self.url(&format!("rest/v1/{table}"))?;
        {
            let mut query = url.query_pairs_mut();
            if method == Method::GET {
                query.append_pair("select", "*");
            }
            for (column, value) in filters {
                query.append_pair(column, &format!("eq.{value}"));
            }
        }

        let mut request = self
            .backend
            .request(method, url)
            .await
            .header("Prefer", "return=representation");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = check_status(request.send().await?).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| ProfileError::Decode(e.to_string()))
    }

    async fn require_session(&self) -> Result<(), ProfileError> {
        if self.backend.has_session().await {
            Ok(())
        } else {
            Err(ProfileError::NotAuthenticated)
        }
    }

    fn url(&self, path: &str) -> Result<url::Url, ProfileError> {
        self.backend
            .url(path)
            .map_err(|e| ProfileError::Decode(format!("invalid backend URL: {e}")))
    }

    fn notify_failure<T>(&self, result: &Result<T, ProfileError>, description: &str) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "{description}");
            let description = match e {
                ProfileError::NotAuthenticated | ProfileError::InvalidInput(_) => e.user_message(),
                _ => description.to_string(),
            };
            self.notifier
                .notify(Notice::destructive("Error", description));
        }
    }
}

/// Turn a non-2xx response into `ProfileError::Backend`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProfileError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = ApiErrorBody::parse(&body).message_or(&body);
    Err(ProfileError::Backend {
        status: status.as_u16(),
        message: if status == StatusCode::UNAUTHORIZED {
            "Session expired, please log in again".to_string()
        } else {
            message
        },
    })
}

fn first_row<T>(rows: Vec<T>, what: &str) -> Result<T, ProfileError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| ProfileError::NotFound(what.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            ProfileError::NotFound("Profile".to_string()).user_message(),
            "Profile not found"
        );
        assert_eq!(
            ProfileError::Backend {
                status: 409,
                message: "duplicate key".to_string()
            }
            .to_string(),
            "API error: 409 - duplicate key"
        );
    }

    #[test]
    fn test_first_row() {
        assert_eq!(first_row(vec![1, 2], "Row").ok(), Some(1));
        assert!(matches!(
            first_row::<i32>(vec![], "Row"),
            Err(ProfileError::NotFound(_))
        ));
    }
}
