use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::claims::ClaimError;

/// Errors surfaced by the activation and batch-admin handlers. Each maps
/// to a fixed explanatory response the front end can localize.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("Unknown sign code. Please contact support.")]
    InvalidToken,
    #[error("This sign is already linked to another account.")]
    AlreadyClaimedByOther,
    #[error("Your sign-in link expired. Please request a new one.")]
    ExpiredAuthLink,
    #[error("Sign activation failed. Please try again.")]
    GenericFailure,
    #[error("Batch not found")]
    BatchNotFound,
    #[error("error: {0}")]
    Generic(String),
    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for ActivationError {
    fn into_response(self) -> axum::response::Response {
        use ActivationError::*;
        let status_code = match self {
            InvalidToken => StatusCode::NOT_FOUND,
            AlreadyClaimedByOther => StatusCode::CONFLICT,
            ExpiredAuthLink => StatusCode::UNAUTHORIZED,
            GenericFailure => StatusCode::INTERNAL_SERVER_ERROR,
            BatchNotFound => StatusCode::NOT_FOUND,
            Generic(_) => StatusCode::BAD_REQUEST,
            InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status_code, self.to_string()).into_response()
    }
}

impl From<ClaimError> for ActivationError {
    fn from(e: ClaimError) -> Self {
        match e {
            ClaimError::InvalidToken => ActivationError::InvalidToken,
            ClaimError::AlreadyClaimedByOther => ActivationError::AlreadyClaimedByOther,
            ClaimError::ExpiredAuthLink => ActivationError::ExpiredAuthLink,
            ClaimError::Generic(msg) => {
                tracing::error!(error = %msg, "claim failed unexpectedly");
                ActivationError::GenericFailure
            }
        }
    }
}
