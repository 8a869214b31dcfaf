use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};

use crate::utils::state::AppState;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Identity resolved through the auth provider; rejects the request when
/// no valid bearer token is presented.
pub struct AuthenticatedCustomer(pub String);

impl<S> FromRequestParts<S> for AuthenticatedCustomer
where
    S: Send + Sync + 'static,
    AppState: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = bearer_token(parts).ok_or_else(|| {
            (StatusCode::UNAUTHORIZED, "Missing Authorization header").into_response()
        })?;

        match app_state.auth.identity_for(token).await {
            Ok(Some(identity)) => Ok(AuthenticatedCustomer(identity)),
            Ok(None) => Err((StatusCode::UNAUTHORIZED, "Invalid token").into_response()),
            Err(e) => {
                tracing::error!(error = %e, "identity lookup failed");
                Err((StatusCode::INTERNAL_SERVER_ERROR, "Authentication error").into_response())
            }
        }
    }
}

/// Optional identity for public routes: anonymous visitors and visitors
/// with a stale token both come through as `None`.
pub struct MaybeCustomer(pub Option<String>);

impl<S> FromRequestParts<S> for MaybeCustomer
where
    S: Send + Sync + 'static,
    AppState: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let Some(token) = bearer_token(parts) else {
            return Ok(MaybeCustomer(None));
        };

        match app_state.auth.identity_for(token).await {
            Ok(identity) => Ok(MaybeCustomer(identity)),
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed, treating visitor as anonymous");
                Ok(MaybeCustomer(None))
            }
        }
    }
}
