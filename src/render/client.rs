use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::RenderError;

/// Payload sent to the external rendering webhook.
#[derive(Clone, Debug, Serialize)]
pub struct RenderRequest {
    pub qr_url: String,
    pub language: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub property_type: String,
    pub phone: bool,
    pub token: String,
}

/// What the webhook answered. The service either returns the image
/// inline or a JSON body pointing at a fetchable URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Image(Vec<u8>),
    Redirect(String),
}

#[derive(Deserialize)]
struct RedirectBody {
    url: String,
}

#[async_trait]
pub trait RenderService: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, RenderError>;
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RenderError>;
}

/// Reqwest-backed client for the rendering webhook.
pub struct HttpRenderClient {
    http: reqwest::Client,
    webhook_url: String,
}

impl HttpRenderClient {
    pub fn new(http: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }
}

#[async_trait]
impl RenderService for HttpRenderClient {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutcome, RenderError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("image/") {
            let bytes = response.bytes().await?;
            Ok(RenderOutcome::Image(bytes.to_vec()))
        } else if content_type.starts_with("application/json") {
            let body: RedirectBody = response
                .json()
                .await
                .map_err(|e| RenderError::MalformedResponse(e.to_string()))?;
            Ok(RenderOutcome::Redirect(body.url))
        } else {
            // A third shape is a contract violation, never silently skipped.
            Err(RenderError::UnexpectedContentType(content_type))
        }
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, RenderError> {
        let bytes = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
