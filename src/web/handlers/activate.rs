use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::SignStatus,
    utils::state::AppState,
    web::{error::ActivationError, extract::MaybeCustomer},
};

/// What the front end should do for a visited activation URL.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ActivationStep {
    /// Fresh or half-claimed sign: collect an email and send a sign-in link.
    Onboard { token: String },
    /// Visitor is already authenticated: go straight to completion.
    Complete { token: String },
    /// Sign is bound: skip onboarding entirely.
    Redirect {
        listing_id: Uuid,
        listing_url: String,
    },
}

/// `GET /activate/{token}`: public entry point for a scanned sign.
pub async fn activation_front_door(
    State(state): State<AppState>,
    Path(token): Path<String>,
    MaybeCustomer(identity): MaybeCustomer,
) -> Result<Json<ActivationStep>, ActivationError> {
    if let Some(listing_id) = state.cache.assigned_listing_cache.get(&token).await {
        return Ok(Json(ActivationStep::Redirect {
            listing_id,
            listing_url: state.urls.listing_url(listing_id),
        }));
    }

    let record = state
        .token_store
        .find_by_activation_token(&token)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "token lookup failed");
            ActivationError::InternalServerError
        })?
        .ok_or(ActivationError::InvalidToken)?;

    if record.status == SignStatus::Assigned {
        let Some(listing_id) = record.listing_id else {
            // Inconsistent row; fail closed rather than let the claim
            // path create a second listing for this sign.
            tracing::error!(token_id = %record.id, "assigned token has no listing bound");
            return Err(ActivationError::GenericFailure);
        };
        state
            .cache
            .assigned_listing_cache
            .insert(token, listing_id)
            .await;
        return Ok(Json(ActivationStep::Redirect {
            listing_id,
            listing_url: state.urls.listing_url(listing_id),
        }));
    }

    // An existing session skips the email step entirely.
    Ok(Json(match identity {
        Some(_) => ActivationStep::Complete { token },
        None => ActivationStep::Onboard { token },
    }))
}

#[derive(Deserialize)]
pub struct SendLinkRequest {
    pub email: String,
}

/// `POST /activate/{token}/link`: issue a passwordless sign-in link
/// whose redirect target carries the token back to the completion step.
pub async fn send_sign_in_link(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<SendLinkRequest>,
) -> Result<impl IntoResponse, ActivationError> {
    state
        .token_store
        .find_by_activation_token(&token)
        .await
        .map_err(|_| ActivationError::InternalServerError)?
        .ok_or(ActivationError::InvalidToken)?;

    let redirect_to = format!(
        "{}/activate/{token}/complete",
        state.urls.activation_base.trim_end_matches('/')
    );
    // Delivery is fire-and-forget; the user can always request another link.
    if let Err(e) = state.auth.send_sign_in_link(&payload.email, &redirect_to).await {
        tracing::warn!(error = %e, "sign-in link issuance failed");
    }
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize, Default)]
pub struct CompleteClaimRequest {
    /// Bearer token from the settled auth callback, when the caller
    /// already has one.
    pub access_token: Option<String>,
    /// Client session to wait on otherwise.
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub listing_id: Uuid,
    pub listing_url: String,
    /// Tells the consuming UI to show first-time guidance.
    pub onboarding: bool,
}

/// `POST /activate/{token}/complete`: waits (bounded) for an
/// authenticated identity, then runs the claim and hands back the bound
/// listing.
pub async fn complete_claim(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<CompleteClaimRequest>,
) -> Result<Json<ClaimResponse>, ActivationError> {
    let identity = resolve_identity(&state, payload).await?;

    let listing_id = state.claims.claim(&token, &identity).await?;
    state
        .cache
        .assigned_listing_cache
        .insert(token, listing_id)
        .await;

    Ok(Json(ClaimResponse {
        listing_id,
        listing_url: state.urls.listing_url(listing_id),
        onboarding: true,
    }))
}

/// Bounded wait for an identity: a provided access token is checked
/// directly; otherwise the client's session is awaited until the
/// completion budget runs out.
async fn resolve_identity(
    state: &AppState,
    payload: CompleteClaimRequest,
) -> Result<String, ActivationError> {
    if let Some(access_token) = payload.access_token {
        match tokio::time::timeout(state.completion_wait, state.auth.identity_for(&access_token))
            .await
        {
            Ok(Ok(Some(identity))) => return Ok(identity),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "identity lookup failed during completion"),
            Err(_) => tracing::warn!("identity lookup timed out during completion"),
        }
    } else if let Some(client_id) = payload.client_id {
        if let Some(session) = state
            .sessions
            .wait_for_session(&client_id, state.completion_wait)
            .await
        {
            match state.auth.identity_for(&session.access_token).await {
                Ok(Some(identity)) => return Ok(identity),
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "identity lookup failed after session settled"),
            }
        }
    }
    Err(ActivationError::ExpiredAuthLink)
}
