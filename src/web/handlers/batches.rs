use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::BatchSpec,
    render::{poller::BatchPoller, RenderError, TokenRenderReport},
    tokens::GenerateError,
    utils::state::AppState,
    web::{error::ActivationError, extract::AuthenticatedCustomer},
};

#[derive(Deserialize)]
pub struct CreateBatchRequest {
    #[serde(flatten)]
    pub spec: BatchSpec,
    pub count: usize,
}

#[derive(Serialize)]
pub struct CreateBatchResponse {
    pub batch_id: Uuid,
    pub count: usize,
    pub activation_tokens: Vec<String>,
}

/// `POST /batches`: mint a print batch of sign tokens.
pub async fn create_batch(
    State(state): State<AppState>,
    AuthenticatedCustomer(_operator): AuthenticatedCustomer,
    Json(payload): Json<CreateBatchRequest>,
) -> Result<impl IntoResponse, ActivationError> {
    let generated = state
        .generator
        .generate_batch(payload.spec, payload.count)
        .await
        .map_err(|e| match e {
            GenerateError::InvalidCount(_) => ActivationError::Generic(e.to_string()),
            GenerateError::Repository(e) => {
                tracing::error!(error = ?e, "batch generation failed");
                ActivationError::InternalServerError
            }
        })?;

    tracing::info!(batch_id = %generated.batch.id, count = generated.tokens.len(), "batch created");
    Ok((
        StatusCode::CREATED,
        Json(CreateBatchResponse {
            batch_id: generated.batch.id,
            count: generated.tokens.len(),
            activation_tokens: generated
                .tokens
                .into_iter()
                .map(|t| t.activation_token)
                .collect(),
        }),
    ))
}

#[derive(Serialize)]
pub struct BatchRenderResponse {
    pub batch_id: Uuid,
    pub rendered: Vec<TokenRenderReport>,
    /// Tokens still lacking an asset after this pass; a background
    /// poller keeps watching the batch while this is non-zero.
    pub outstanding: u64,
}

/// `POST /batches/{batch_id}/render`: render every missing asset in the
/// batch and, when any remain, start (or restart) its reconciliation
/// poller.
pub async fn render_batch(
    State(state): State<AppState>,
    AuthenticatedCustomer(_operator): AuthenticatedCustomer,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchRenderResponse>, ActivationError> {
    let rendered = state
        .render
        .render_batch(batch_id)
        .await
        .map_err(render_error)?;

    let outstanding = state
        .token_store
        .count_missing_assets(batch_id)
        .await
        .map_err(|_| ActivationError::InternalServerError)?;

    let mut pollers = state.pollers.write().await;
    if outstanding > 0 {
        // Replacing an entry drops the previous poller, which aborts it.
        pollers.insert(
            batch_id,
            BatchPoller::spawn(
                std::sync::Arc::clone(&state.token_store),
                batch_id,
                state.poll_interval,
            ),
        );
    } else {
        pollers.remove(&batch_id);
    }
    drop(pollers);

    Ok(Json(BatchRenderResponse {
        batch_id,
        rendered,
        outstanding,
    }))
}

#[derive(Serialize)]
pub struct TokenRenderResponse {
    pub asset_path: String,
    pub asset_url: String,
}

/// `POST /tokens/{token}/render`: retry a single failed asset.
pub async fn render_token(
    State(state): State<AppState>,
    AuthenticatedCustomer(_operator): AuthenticatedCustomer,
    Path(token): Path<String>,
) -> Result<Json<TokenRenderResponse>, ActivationError> {
    let asset_path = state
        .render
        .render_one(&token)
        .await
        .map_err(render_error)?;
    let asset_url = state.render.asset_url(&asset_path);
    Ok(Json(TokenRenderResponse {
        asset_path,
        asset_url,
    }))
}

#[derive(Debug, Serialize)]
pub struct BatchCountsResponse {
    pub batch_id: Uuid,
    pub unassigned: u64,
    pub sold: u64,
    pub assigned: u64,
    pub total: u64,
}

/// `GET /batches/{batch_id}/counts`: derived per-status counts.
pub async fn batch_counts(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchCountsResponse>, ActivationError> {
    state
        .batch_store
        .find_one(batch_id)
        .await
        .map_err(|_| ActivationError::InternalServerError)?
        .ok_or(ActivationError::BatchNotFound)?;

    let counts = state
        .token_store
        .status_counts(batch_id)
        .await
        .map_err(|_| ActivationError::InternalServerError)?;

    Ok(Json(BatchCountsResponse {
        batch_id,
        unassigned: counts.unassigned,
        sold: counts.sold,
        assigned: counts.assigned,
        total: counts.total(),
    }))
}

fn render_error(e: RenderError) -> ActivationError {
    match e {
        RenderError::BatchNotFound(_) => ActivationError::BatchNotFound,
        RenderError::TokenNotFound => ActivationError::InvalidToken,
        other => {
            tracing::error!(error = ?other, "rendering failed");
            ActivationError::InternalServerError
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::queries::MockStore;
    use crate::utils::state::test::{test_app_state, StaticAuthProvider};
    use std::sync::Arc;
    use std::time::Duration;

    fn spec() -> BatchSpec {
        BatchSpec {
            language: "fr".to_string(),
            property_type: "house".to_string(),
            transaction_type: "rent".to_string(),
            phone_space: false,
        }
    }

    fn state_with_store() -> (AppState, MockStore) {
        let store = MockStore::default();
        let state = test_app_state(
            store.clone(),
            Arc::new(StaticAuthProvider {
                identities: Default::default(),
            }),
        );
        (state, store)
    }

    #[tokio::test]
    async fn batch_creation_returns_all_minted_tokens() {
        let (state, store) = state_with_store();
        let response = create_batch(
            State(state),
            AuthenticatedCustomer("ops".to_string()),
            Json(CreateBatchRequest {
                spec: spec(),
                count: 25,
            }),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(store.tokens.read().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn oversized_batch_request_is_rejected() {
        let (state, store) = state_with_store();
        let err = create_batch(
            State(state),
            AuthenticatedCustomer("ops".to_string()),
            Json(CreateBatchRequest {
                spec: spec(),
                count: crate::tokens::MAX_BATCH_SIZE + 1,
            }),
        )
        .await
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, ActivationError::Generic(_)));
        assert!(store.tokens.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rendering_a_full_batch_leaves_no_poller_behind() {
        let (state, _store) = state_with_store();
        let batch = state
            .generator
            .generate_batch(spec(), 5)
            .await
            .unwrap();

        let response = render_batch(
            State(state.clone()),
            AuthenticatedCustomer("ops".to_string()),
            Path(batch.batch.id),
        )
        .await
        .unwrap();
        assert_eq!(response.0.rendered.len(), 5);
        assert_eq!(response.0.outstanding, 0);
        assert!(!state.pollers.read().await.contains_key(&batch.batch.id));
    }

    #[tokio::test]
    async fn counts_track_the_claim_lifecycle() {
        let (state, _store) = state_with_store();
        let batch = state.generator.generate_batch(spec(), 3).await.unwrap();
        let token = batch.tokens[0].activation_token.clone();
        state.claims.claim(&token, "u1").await.unwrap();

        let counts = batch_counts(State(state), Path(batch.batch.id))
            .await
            .unwrap();
        assert_eq!(counts.0.unassigned, 2);
        assert_eq!(counts.0.assigned, 1);
        assert_eq!(counts.0.total, 3);
    }

    #[tokio::test]
    async fn counts_for_an_unknown_batch_are_a_404() {
        let (state, _store) = state_with_store();
        let err = batch_counts(State(state), Path(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert_eq!(err, ActivationError::BatchNotFound);
    }

    #[tokio::test]
    async fn registered_poller_retires_once_every_asset_lands() {
        let (state, store) = state_with_store();
        let batch = state.generator.generate_batch(spec(), 2).await.unwrap();
        let retry_token = batch.tokens[0].activation_token.clone();

        state.pollers.write().await.insert(
            batch.batch.id,
            BatchPoller::spawn(
                Arc::clone(&state.token_store),
                batch.batch.id,
                state.poll_interval,
            ),
        );

        for token in &batch.tokens {
            state.render.render_one(&token.activation_token).await.unwrap();
        }
        assert!(store
            .tokens
            .read()
            .unwrap()
            .get(&retry_token)
            .unwrap()
            .rendered_asset_path
            .is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let pollers = state.pollers.read().await;
        assert!(pollers.get(&batch.batch.id).is_some_and(|p| p.is_finished()));
    }
}
