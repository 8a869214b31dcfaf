//! Asset render pipeline: drive the external rendering webhook per token,
//! upload the resulting image to blob storage at a deterministic path and
//! record that path on the token.

pub mod client;
pub mod poller;
pub mod storage;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::{
        error::RepositoryError,
        repository::{BatchStore, TokenStore},
    },
    models::SignTokenRecord,
};

pub use client::{HttpRenderClient, RenderOutcome, RenderRequest, RenderService};
pub use poller::BatchPoller;
pub use storage::{AwsS3Blobs, BlobError, BlobStore, MemoryBlobStore};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected render response content type: {0:?}")]
    UnexpectedContentType(String),
    #[error("malformed render response: {0}")]
    MalformedResponse(String),
    #[error("token references unknown batch {0}")]
    BatchNotFound(Uuid),
    #[error("unknown activation token")]
    TokenNotFound,
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Deterministic asset location; retrying a render overwrites the same
/// object instead of accumulating copies.
pub fn asset_key(batch_id: Uuid, activation_token: &str) -> String {
    format!("{batch_id}/{activation_token}.png")
}

/// Per-token outcome of a batch render run.
#[derive(Clone, Debug, Serialize)]
pub struct TokenRenderReport {
    pub activation_token: String,
    pub asset_path: Option<String>,
    pub error: Option<String>,
}

pub struct RenderPipeline {
    renderer: Arc<dyn RenderService>,
    blobs: Arc<dyn BlobStore>,
    tokens: Arc<dyn TokenStore>,
    batches: Arc<dyn BatchStore>,
    activation_base_url: String,
}

impl RenderPipeline {
    pub fn new(
        renderer: Arc<dyn RenderService>,
        blobs: Arc<dyn BlobStore>,
        tokens: Arc<dyn TokenStore>,
        batches: Arc<dyn BatchStore>,
        activation_base_url: impl Into<String>,
    ) -> Self {
        Self {
            renderer,
            blobs,
            tokens,
            batches,
            activation_base_url: activation_base_url.into(),
        }
    }

    /// Renders the printable asset for one token and records its path.
    pub async fn render_asset(&self, token: &SignTokenRecord) -> Result<String, RenderError> {
        let batch = self
            .batches
            .find_one(token.batch_id)
            .await?
            .ok_or(RenderError::BatchNotFound(token.batch_id))?;

        let request = RenderRequest {
            qr_url: format!(
                "{}/activate/{}",
                self.activation_base_url.trim_end_matches('/'),
                token.activation_token
            ),
            language: batch.language,
            transaction_type: batch.transaction_type,
            property_type: batch.property_type,
            phone: batch.phone_space,
            token: token.activation_token.clone(),
        };

        let image = match self.renderer.render(&request).await? {
            RenderOutcome::Image(bytes) => bytes,
            RenderOutcome::Redirect(url) => self.renderer.fetch_image(&url).await?,
        };

        let key = asset_key(token.batch_id, &token.activation_token);
        self.blobs.put(&key, image).await?;
        self.tokens.set_rendered_asset_path(token.id, &key).await?;
        Ok(key)
    }

    /// Renders every token of the batch that still lacks an asset.
    /// Tokens are processed independently; one failure never aborts the
    /// siblings.
    pub async fn render_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<TokenRenderReport>, RenderError> {
        let pending = self.tokens.find_missing_assets(batch_id).await?;
        let mut report = Vec::with_capacity(pending.len());
        for token in pending {
            match self.render_asset(&token).await {
                Ok(path) => report.push(TokenRenderReport {
                    activation_token: token.activation_token,
                    asset_path: Some(path),
                    error: None,
                }),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        activation_token = %token.activation_token,
                        "asset render failed, continuing with remaining tokens"
                    );
                    report.push(TokenRenderReport {
                        activation_token: token.activation_token,
                        asset_path: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Single-token retry; the deterministic path makes the upload
    /// idempotent.
    pub async fn render_one(&self, activation_token: &str) -> Result<String, RenderError> {
        let token = self
            .tokens
            .find_by_activation_token(activation_token)
            .await?
            .ok_or(RenderError::TokenNotFound)?;
        self.render_asset(&token).await
    }

    pub fn asset_url(&self, key: &str) -> String {
        self.blobs.public_url(key)
    }
}
