//! HTTP client for the nutrition analysis service.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::instrument;
use url::Url;

use nutrifit_core::{NutritionResult, UserId};

use super::{AnalysisError, ImageHandle};

/// Path of the analysis endpoint, relative to the service base URL.
const ENDPOINT: &str = "calculate-nutrition/";

/// One image to analyse, on behalf of one user. Consumed by the request.
#[derive(Debug)]
pub struct AnalysisRequest {
    pub image: ImageHandle,
    pub owner_id: UserId,
}

/// Analysis service client.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: reqwest::Client,
    endpoint: Url,
}

impl AnalysisClient {
    /// Create a client for the service rooted at `base`.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint URL cannot be built or the HTTP client
    /// fails to build.
    pub fn new(base: &Url, timeout: Duration) -> Result<Self, AnalysisError> {
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(ENDPOINT)?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, endpoint })
    }

    /// Full URL requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Send one image and decode the nutrition result. Never retries.
    ///
    /// # Errors
    ///
    /// - `Transport` if the service cannot be reached
    /// - `Service` for any non-2xx status
    /// - `MalformedResponse` if the body does not match the result shape
    #[instrument(skip(self, request), fields(image_id = %request.image.id, user_id = %request.owner_id))]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<NutritionResult, AnalysisError> {
        let AnalysisRequest { image, owner_id } = request;
        let size = image.bytes.len();

        let file = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;
        let form = Form::new()
            .part("file", file)
            .text("user_id", owner_id.into_inner());

        tracing::debug!(size, endpoint = %self.endpoint, "Sending image for analysis");

        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AnalysisError::MalformedResponse(e.to_string()))
    }
}
