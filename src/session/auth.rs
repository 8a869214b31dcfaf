use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SessionTokens;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("auth provider rejected the request: {0}")]
    Rejected(String),
}

/// External passwordless authentication provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Issues a passwordless sign-in link delivered by email. The mail
    /// itself is a fire-and-forget concern of the provider.
    async fn send_sign_in_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError>;

    /// Resolves the identity behind a bearer access token; `None` when
    /// the token is not (or no longer) valid.
    async fn identity_for(&self, access_token: &str) -> Result<Option<String>, AuthError>;

    /// Presents a backed-up token pair directly, bypassing the normal
    /// session rehydration. Returns the refreshed pair.
    async fn set_session(&self, tokens: &SessionTokens) -> Result<SessionTokens, AuthError>;
}

#[derive(Serialize)]
struct MagicLinkRequest<'a> {
    email: &'a str,
    redirect_to: &'a str,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// HTTP client for the hosted auth provider.
pub struct HttpAuthProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpAuthProvider {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn send_sign_in_link(&self, email: &str, redirect_to: &str) -> Result<(), AuthError> {
        let response = self
            .http
            .post(self.endpoint("/auth/v1/magiclink"))
            .header("apikey", self.api_key.expose_secret())
            .json(&MagicLinkRequest { email, redirect_to })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "magiclink request answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn identity_for(&self, access_token: &str) -> Result<Option<String>, AuthError> {
        let response = self
            .http
            .get(self.endpoint("/auth/v1/user"))
            .header("apikey", self.api_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let user: UserResponse = response
            .error_for_status()?
            .json()
            .await
            .map_err(AuthError::Http)?;
        Ok(Some(user.id))
    }

    async fn set_session(&self, tokens: &SessionTokens) -> Result<SessionTokens, AuthError> {
        let refreshed: SessionTokens = self
            .http
            .post(self.endpoint("/auth/v1/token?grant_type=refresh_token"))
            .header("apikey", self.api_key.expose_secret())
            .json(&RefreshRequest {
                refresh_token: &tokens.refresh_token,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(refreshed)
    }
}
