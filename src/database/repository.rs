use crate::{
    database::error::RepositoryError,
    models::{BatchRecord, ListingRecord, SignTokenRecord, StatusCounts},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Durable store of sign tokens.
///
/// The two conditional updates (`mark_sold`, `bind_listing`) are the only
/// mutations of claim-relevant fields; both re-check their precondition in
/// the update filter and report through the returned bool whether this
/// caller's write landed.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Bulk insert of a freshly generated batch. All-or-nothing: a failed
    /// insert must leave no partial batch behind.
    async fn insert_many(&self, tokens: Vec<SignTokenRecord>) -> Result<(), RepositoryError>;

    async fn find_by_activation_token(
        &self,
        activation_token: &str,
    ) -> Result<Option<SignTokenRecord>, RepositoryError>;

    /// Tokens of a batch that do not yet have a rendered asset.
    async fn find_missing_assets(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<SignTokenRecord>, RepositoryError>;

    async fn count_missing_assets(&self, batch_id: Uuid) -> Result<u64, RepositoryError>;

    /// Derived per-status counts for a batch.
    async fn status_counts(&self, batch_id: Uuid) -> Result<StatusCounts, RepositoryError>;

    /// Claim the token for `customer_id` iff no customer holds it yet.
    /// Returns false when the precondition no longer holds.
    async fn mark_sold(
        &self,
        activation_token: &str,
        customer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    /// Bind a listing to the token iff `customer_id` holds it and no
    /// listing is bound yet. Returns false when the precondition no
    /// longer holds.
    async fn bind_listing(
        &self,
        activation_token: &str,
        customer_id: &str,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn set_rendered_asset_path(
        &self,
        id: Uuid,
        path: &str,
    ) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    async fn insert_one(&self, batch: BatchRecord) -> Result<(), RepositoryError>;
    async fn find_one(&self, id: Uuid) -> Result<Option<BatchRecord>, RepositoryError>;
    /// Rolls back a batch row whose token insert failed, so no partial
    /// batch is ever exposed to operators.
    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn insert_one(&self, listing: ListingRecord) -> Result<(), RepositoryError>;
    async fn find_one(&self, id: Uuid) -> Result<Option<ListingRecord>, RepositoryError>;
    /// Removes an orphan shell created by a lost bind race.
    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError>;
}
