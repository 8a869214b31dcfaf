//! Token generation: unique high-entropy activation tokens grouped into
//! batches that share print metadata.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::{
        error::RepositoryError,
        repository::{BatchStore, TokenStore},
    },
    models::{BatchRecord, BatchSpec, SignStatus, SignTokenRecord},
};

/// Upper bound on tokens per generation run, to keep request sizes sane.
pub const MAX_BATCH_SIZE: usize = 500;

/// Activation token length. 36^12 possible values make collisions
/// negligible at expected print volumes.
pub const TOKEN_LENGTH: usize = 12;

const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("batch size must be between 1 and {MAX_BATCH_SIZE}, got {0}")]
    InvalidCount(usize),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Draws one activation token from the uppercase+digits alphabet.
pub fn generate_activation_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// A fresh unassigned token row for the given batch.
pub fn new_sign_token(batch_id: Uuid) -> SignTokenRecord {
    SignTokenRecord {
        id: Uuid::new_v4(),
        activation_token: generate_activation_token(),
        status: SignStatus::Unassigned,
        customer_id: None,
        listing_id: None,
        batch_id,
        rendered_asset_path: None,
        created_at: Utc::now(),
        sold_at: None,
        assigned_at: None,
    }
}

/// Result of a generation run: the batch row plus its token rows.
#[derive(Clone, Debug)]
pub struct GeneratedBatch {
    pub batch: BatchRecord,
    pub tokens: Vec<SignTokenRecord>,
}

pub struct TokenGenerator {
    tokens: Arc<dyn TokenStore>,
    batches: Arc<dyn BatchStore>,
}

impl TokenGenerator {
    pub fn new(tokens: Arc<dyn TokenStore>, batches: Arc<dyn BatchStore>) -> Self {
        Self { tokens, batches }
    }

    /// Generates `count` tokens under a new batch and inserts them as a
    /// single set. A failed token insert rolls the batch row back, so a
    /// failed run leaves nothing behind and is retried wholesale.
    pub async fn generate_batch(
        &self,
        spec: BatchSpec,
        count: usize,
    ) -> Result<GeneratedBatch, GenerateError> {
        if count == 0 || count > MAX_BATCH_SIZE {
            return Err(GenerateError::InvalidCount(count));
        }

        let batch = BatchRecord {
            id: Uuid::new_v4(),
            language: spec.language,
            property_type: spec.property_type,
            transaction_type: spec.transaction_type,
            phone_space: spec.phone_space,
            created_at: Utc::now(),
        };

        // Guard against the (unlikely) in-run duplicate draw; the unique
        // index on activation_token catches cross-batch collisions.
        let mut seen = HashSet::with_capacity(count);
        let mut tokens = Vec::with_capacity(count);
        while tokens.len() < count {
            let token = new_sign_token(batch.id);
            if seen.insert(token.activation_token.clone()) {
                tokens.push(token);
            }
        }

        self.batches.insert_one(batch.clone()).await?;
        if let Err(e) = self.tokens.insert_many(tokens.clone()).await {
            tracing::error!(error = ?e, batch_id = %batch.id, "token insert failed, rolling batch back");
            if let Err(e) = self.batches.delete_one(batch.id).await {
                tracing::warn!(error = ?e, batch_id = %batch.id, "failed to roll back batch row");
            }
            return Err(e.into());
        }

        tracing::info!(batch_id = %batch.id, count, "generated token batch");
        Ok(GeneratedBatch { batch, tokens })
    }
}
