//! Claim Orchestrator: drives the `unassigned -> sold -> assigned`
//! transition for a sign token, exactly once per token, idempotently for
//! the claiming identity.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::{
        error::RepositoryError,
        repository::{BatchStore, ListingStore, TokenStore},
    },
    models::{ListingRecord, SignStatus, SignTokenRecord},
};

/// Failures surfaced verbatim to the activation front door. None of them
/// is retried automatically beyond the idempotent re-entry of `claim`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("unknown activation token")]
    InvalidToken,
    #[error("sign already claimed by another account")]
    AlreadyClaimedByOther,
    #[error("sign-in link expired before an identity was available")]
    ExpiredAuthLink,
    #[error("claim failed: {0}")]
    Generic(String),
}

impl From<RepositoryError> for ClaimError {
    fn from(e: RepositoryError) -> Self {
        ClaimError::Generic(e.to_string())
    }
}

pub struct ClaimOrchestrator {
    tokens: Arc<dyn TokenStore>,
    batches: Arc<dyn BatchStore>,
    listings: Arc<dyn ListingStore>,
}

impl ClaimOrchestrator {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        batches: Arc<dyn BatchStore>,
        listings: Arc<dyn ListingStore>,
    ) -> Self {
        Self {
            tokens,
            batches,
            listings,
        }
    }

    /// Claims `activation_token` for `identity` and returns the bound
    /// listing id.
    ///
    /// Every step re-checks its precondition through a conditional update,
    /// so concurrent tabs, double-taps and crash retries converge on a
    /// single listing: losers of the bind race delete their orphan shell
    /// and return the winner's listing id.
    pub async fn claim(&self, activation_token: &str, identity: &str) -> Result<Uuid, ClaimError> {
        let token = self
            .read_token(activation_token)
            .await?
            .ok_or(ClaimError::InvalidToken)?;

        if let Some(owner) = token.customer_id.as_deref() {
            if owner != identity {
                return Err(ClaimError::AlreadyClaimedByOther);
            }
            if let Some(listing_id) = token.listing_id {
                // Idempotent short-circuit: same identity, already bound.
                return Ok(listing_id);
            }
        }

        if token.status == SignStatus::Assigned && token.listing_id.is_none() {
            // Data inconsistency; fail closed instead of creating a
            // second listing for the sign.
            tracing::error!(
                token_id = %token.id,
                "token is assigned but has no listing bound"
            );
            return Err(ClaimError::Generic(
                "assigned token without a listing".to_string(),
            ));
        }

        if token.customer_id.is_none() {
            let won = self
                .tokens
                .mark_sold(activation_token, identity, Utc::now())
                .await?;
            if !won {
                // A concurrent claim got there first. Re-read to find out
                // whose it is now.
                let current = self
                    .read_token(activation_token)
                    .await?
                    .ok_or(ClaimError::InvalidToken)?;
                if current.customer_id.as_deref() != Some(identity) {
                    return Err(ClaimError::AlreadyClaimedByOther);
                }
                if let Some(listing_id) = current.listing_id {
                    return Ok(listing_id);
                }
            }
        }

        self.bind(activation_token, identity, &token).await
    }

    /// Creates the draft listing shell from batch defaults and binds it to
    /// the token.
    async fn bind(
        &self,
        activation_token: &str,
        identity: &str,
        token: &SignTokenRecord,
    ) -> Result<Uuid, ClaimError> {
        let batch = self
            .batches
            .find_one(token.batch_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(batch_id = %token.batch_id, "token references a missing batch");
                ClaimError::Generic("token batch not found".to_string())
            })?;

        let shell = ListingRecord::shell(identity, &batch);
        self.listings.insert_one(shell.clone()).await?;

        let bound = self
            .tokens
            .bind_listing(activation_token, identity, shell.id, Utc::now())
            .await?;
        if !bound {
            // Another bind for the same sign won while we were creating
            // the shell; ours is an orphan now.
            if let Err(e) = self.listings.delete_one(shell.id).await {
                tracing::warn!(error = ?e, listing_id = %shell.id, "failed to delete orphan listing shell");
            }
            let current = self
                .read_token(activation_token)
                .await?
                .ok_or(ClaimError::InvalidToken)?;
            return current.listing_id.ok_or_else(|| {
                ClaimError::Generic("bind lost but no listing recorded".to_string())
            });
        }

        tracing::info!(
            token_id = %token.id,
            listing_id = %shell.id,
            "sign claimed and bound to new listing"
        );
        Ok(shell.id)
    }

    async fn read_token(
        &self,
        activation_token: &str,
    ) -> Result<Option<SignTokenRecord>, ClaimError> {
        self.tokens
            .find_by_activation_token(activation_token)
            .await
            .map_err(ClaimError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::queries::MockStore;
    use crate::models::{BatchRecord, BatchSpec, LISTING_STATUS_DRAFT};
    use crate::tokens::TokenGenerator;

    fn spec() -> BatchSpec {
        BatchSpec {
            language: "fr".to_string(),
            property_type: "house".to_string(),
            transaction_type: "rent".to_string(),
            phone_space: false,
        }
    }

    async fn seeded(count: usize) -> (MockStore, ClaimOrchestrator, Vec<String>) {
        let store = MockStore::default();
        let generator =
            TokenGenerator::new(Arc::new(store.clone()), Arc::new(store.clone()));
        let generated = generator.generate_batch(spec(), count).await.unwrap();
        let orchestrator = ClaimOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
        );
        let tokens = generated
            .tokens
            .iter()
            .map(|t| t.activation_token.clone())
            .collect();
        (store, orchestrator, tokens)
    }

    #[tokio::test]
    async fn fresh_claim_creates_a_draft_listing_and_assigns_the_token() {
        let (store, orchestrator, tokens) = seeded(1).await;
        let token = &tokens[0];

        let listing_id = orchestrator.claim(token, "u1").await.unwrap();

        let stored = store.tokens.read().unwrap().get(token).cloned().unwrap();
        assert_eq!(stored.status, SignStatus::Assigned);
        assert_eq!(stored.customer_id.as_deref(), Some("u1"));
        assert_eq!(stored.listing_id, Some(listing_id));
        assert!(stored.created_at <= stored.sold_at.unwrap());
        assert!(stored.sold_at.unwrap() <= stored.assigned_at.unwrap());

        let listing = store.listings.read().unwrap().get(&listing_id).cloned().unwrap();
        assert_eq!(listing.owner_id, "u1");
        assert_eq!(listing.status, LISTING_STATUS_DRAFT);
        // Prefilled from batch defaults.
        assert_eq!(listing.language, "fr");
        assert_eq!(listing.transaction_type, "rent");
    }

    #[tokio::test]
    async fn claim_is_idempotent_for_the_same_identity() {
        let (store, orchestrator, tokens) = seeded(1).await;
        let token = &tokens[0];

        let first = orchestrator.claim(token, "u1").await.unwrap();
        let second = orchestrator.claim(token, "u1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.listings.read().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn claim_by_another_identity_is_rejected_without_mutation() {
        let (store, orchestrator, tokens) = seeded(1).await;
        let token = &tokens[0];

        let listing_id = orchestrator.claim(token, "u1").await.unwrap();
        let before = store.tokens.read().unwrap().get(token).cloned().unwrap();

        let err = orchestrator.claim(token, "u2").await.unwrap_err();
        assert_eq!(err, ClaimError::AlreadyClaimedByOther);

        let after = store.tokens.read().unwrap().get(token).cloned().unwrap();
        assert_eq!(before, after);
        assert_eq!(after.customer_id.as_deref(), Some("u1"));
        assert_eq!(after.listing_id, Some(listing_id));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let (_, orchestrator, _) = seeded(1).await;
        let err = orchestrator.claim("NOSUCHTOKEN0", "u1").await.unwrap_err();
        assert_eq!(err, ClaimError::InvalidToken);
    }

    #[tokio::test]
    async fn assigned_token_without_listing_fails_closed() {
        let (store, orchestrator, tokens) = seeded(1).await;
        let token = &tokens[0];
        {
            let mut repo = store.tokens.write().unwrap();
            let record = repo.get_mut(token).unwrap();
            record.status = SignStatus::Assigned;
            record.customer_id = Some("u1".to_string());
            record.listing_id = None;
        }

        let err = orchestrator.claim(token, "u1").await.unwrap_err();
        assert!(matches!(err, ClaimError::Generic(_)));
        // No rescue listing was created.
        assert!(store.listings.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_only_moves_forward() {
        let (store, orchestrator, tokens) = seeded(2).await;

        orchestrator.claim(&tokens[0], "u1").await.unwrap();
        let assigned = store
            .tokens
            .read()
            .unwrap()
            .get(&tokens[0])
            .cloned()
            .unwrap();
        assert_eq!(assigned.status, SignStatus::Assigned);

        // Re-claiming never regresses the status.
        orchestrator.claim(&tokens[0], "u1").await.unwrap();
        let after = store
            .tokens
            .read()
            .unwrap()
            .get(&tokens[0])
            .cloned()
            .unwrap();
        assert_eq!(after.status, SignStatus::Assigned);

        let untouched = store
            .tokens
            .read()
            .unwrap()
            .get(&tokens[1])
            .cloned()
            .unwrap();
        assert_eq!(untouched.status, SignStatus::Unassigned);
    }

    #[tokio::test]
    async fn concurrent_claims_by_same_identity_converge_on_one_listing() {
        let (store, orchestrator, tokens) = seeded(1).await;
        let orchestrator = Arc::new(orchestrator);
        let token = tokens[0].clone();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orchestrator = Arc::clone(&orchestrator);
            let token = token.clone();
            handles.push(tokio::spawn(
                async move { orchestrator.claim(&token, "u1").await },
            ));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1, "all claims must return the same listing");
        // Orphan shells from lost bind races were cleaned up.
        assert_eq!(store.listings.read().unwrap().len(), 1);
    }
}
