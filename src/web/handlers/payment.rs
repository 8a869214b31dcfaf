use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{utils::state::AppState, web::error::ActivationError};

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub client_id: String,
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub redirect_url: String,
    /// Whether a session backup was written before the redirect.
    pub session_backed_up: bool,
}

/// `POST /payment/checkout`: snapshot the caller's auth session, then
/// hand back the external checkout URL. Backup failure never blocks the
/// purchase.
pub async fn checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ActivationError> {
    let session_backed_up = match state.sessions.backup_session(&payload.client_id).await {
        Ok(done) => done,
        Err(e) => {
            tracing::warn!(error = %e, client_id = %payload.client_id, "session backup failed before checkout");
            false
        }
    };

    Ok(Json(CheckoutResponse {
        redirect_url: state.urls.payment_checkout.clone(),
        session_backed_up,
    }))
}

#[derive(Deserialize)]
pub struct ReturnParams {
    pub client_id: String,
}

#[derive(Serialize)]
pub struct ReturnResponse {
    /// False means the visitor continues anonymously and signs in again.
    pub restored: bool,
}

/// `GET /payment/return`: consume the backup (if any) and re-establish
/// the session with the auth provider.
pub async fn payment_return(
    State(state): State<AppState>,
    Query(params): Query<ReturnParams>,
) -> Json<ReturnResponse> {
    let restored = state.sessions.restore_session(&params.client_id).await;
    Json(ReturnResponse { restored })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::queries::MockStore;
    use crate::models::SessionTokens;
    use crate::utils::state::test::{test_app_state, StaticAuthProvider};
    use std::sync::Arc;

    fn fresh_state() -> AppState {
        test_app_state(
            MockStore::default(),
            Arc::new(StaticAuthProvider {
                identities: Default::default(),
            }),
        )
    }

    #[tokio::test]
    async fn checkout_without_a_session_still_redirects() {
        let state = fresh_state();
        let response = checkout(
            State(state),
            Json(CheckoutRequest {
                client_id: "c1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(!response.0.session_backed_up);
        assert_eq!(response.0.redirect_url, "https://pay.example/checkout");
    }

    #[tokio::test]
    async fn session_survives_the_checkout_round_trip() {
        let state = fresh_state();
        state
            .sessions
            .record_session(
                "c1",
                &SessionTokens {
                    access_token: "at-1".to_string(),
                    refresh_token: "rt-1".to_string(),
                },
            )
            .await
            .unwrap();

        let out = checkout(
            State(state.clone()),
            Json(CheckoutRequest {
                client_id: "c1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert!(out.0.session_backed_up);

        let back = payment_return(
            State(state),
            Query(ReturnParams {
                client_id: "c1".to_string(),
            }),
        )
        .await;
        assert!(back.0.restored);
    }

    #[tokio::test]
    async fn returning_without_a_backup_degrades_to_anonymous() {
        let state = fresh_state();
        let back = payment_return(
            State(state),
            Query(ReturnParams {
                client_id: "c1".to_string(),
            }),
        )
        .await;
        assert!(!back.0.restored);
    }
}
