use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter,
};
use uuid::Uuid;

use crate::models::{
    batches, listings, sign_tokens, BatchRecord, ListingRecord, SignStatus, SignTokenRecord,
    StatusCounts,
};

use super::{
    error::RepositoryError,
    repository::{BatchStore, ListingStore, TokenStore},
};

/// SeaORM-backed store for tokens, batches and listing shells.
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn count_status(
        &self,
        batch_id: Uuid,
        status: SignStatus,
    ) -> Result<u64, RepositoryError> {
        sign_tokens::Entity::find()
            .filter(sign_tokens::Column::BatchId.eq(batch_id))
            .filter(sign_tokens::Column::Status.eq(status))
            .count(&*self.db)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, %batch_id, "failed to count tokens by status");
                RepositoryError::FetchError
            })
    }
}

#[async_trait]
impl TokenStore for SeaOrmStore {
    async fn insert_many(&self, tokens: Vec<SignTokenRecord>) -> Result<(), RepositoryError> {
        // Single multi-row insert; either the whole batch lands or none of it.
        sign_tokens::Entity::insert_many(tokens.into_iter().map(|t| t.into_active_model()))
            .exec(&*self.db)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "bulk token insert failed");
                RepositoryError::StoreError
            })?;
        Ok(())
    }

    async fn find_by_activation_token(
        &self,
        activation_token: &str,
    ) -> Result<Option<SignTokenRecord>, RepositoryError> {
        sign_tokens::Entity::find()
            .filter(sign_tokens::Column::ActivationToken.eq(activation_token))
            .one(&*self.db)
            .await
            .map_err(|_| RepositoryError::FetchError)
    }

    async fn find_missing_assets(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<SignTokenRecord>, RepositoryError> {
        sign_tokens::Entity::find()
            .filter(sign_tokens::Column::BatchId.eq(batch_id))
            .filter(sign_tokens::Column::RenderedAssetPath.is_null())
            .all(&*self.db)
            .await
            .map_err(|_| RepositoryError::FetchError)
    }

    async fn count_missing_assets(&self, batch_id: Uuid) -> Result<u64, RepositoryError> {
        sign_tokens::Entity::find()
            .filter(sign_tokens::Column::BatchId.eq(batch_id))
            .filter(sign_tokens::Column::RenderedAssetPath.is_null())
            .count(&*self.db)
            .await
            .map_err(|_| RepositoryError::FetchError)
    }

    async fn status_counts(&self, batch_id: Uuid) -> Result<StatusCounts, RepositoryError> {
        Ok(StatusCounts {
            unassigned: self.count_status(batch_id, SignStatus::Unassigned).await?,
            sold: self.count_status(batch_id, SignStatus::Sold).await?,
            assigned: self.count_status(batch_id, SignStatus::Assigned).await?,
        })
    }

    async fn mark_sold(
        &self,
        activation_token: &str,
        customer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // Conditional update: only the first claimer gets rows_affected > 0.
        let result = sign_tokens::Entity::update_many()
            .col_expr(
                sign_tokens::Column::CustomerId,
                Expr::value(customer_id.to_string()),
            )
            .col_expr(sign_tokens::Column::Status, Expr::value(SignStatus::Sold))
            .col_expr(sign_tokens::Column::SoldAt, Expr::value(at))
            .filter(sign_tokens::Column::ActivationToken.eq(activation_token))
            .filter(sign_tokens::Column::CustomerId.is_null())
            .exec(&*self.db)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "conditional sold update failed");
                RepositoryError::UpdateError
            })?;
        Ok(result.rows_affected > 0)
    }

    async fn bind_listing(
        &self,
        activation_token: &str,
        customer_id: &str,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        // Conditional update: a concurrent bind by the same customer can
        // win instead, in which case zero rows are touched.
        let result = sign_tokens::Entity::update_many()
            .col_expr(sign_tokens::Column::ListingId, Expr::value(listing_id))
            .col_expr(
                sign_tokens::Column::Status,
                Expr::value(SignStatus::Assigned),
            )
            .col_expr(sign_tokens::Column::AssignedAt, Expr::value(at))
            .filter(sign_tokens::Column::ActivationToken.eq(activation_token))
            .filter(sign_tokens::Column::CustomerId.eq(customer_id))
            .filter(sign_tokens::Column::ListingId.is_null())
            .exec(&*self.db)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "conditional bind update failed");
                RepositoryError::UpdateError
            })?;
        Ok(result.rows_affected > 0)
    }

    async fn set_rendered_asset_path(
        &self,
        id: Uuid,
        path: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sign_tokens::Entity::update_many()
            .col_expr(
                sign_tokens::Column::RenderedAssetPath,
                Expr::value(path.to_string()),
            )
            .filter(sign_tokens::Column::Id.eq(id))
            .exec(&*self.db)
            .await
            .map_err(|_| RepositoryError::UpdateError)?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl BatchStore for SeaOrmStore {
    async fn insert_one(&self, batch: BatchRecord) -> Result<(), RepositoryError> {
        batches::Entity::insert(batch.into_active_model())
            .exec(&*self.db)
            .await
            .map_err(|_| RepositoryError::StoreError)?;
        Ok(())
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<BatchRecord>, RepositoryError> {
        batches::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|_| RepositoryError::FetchError)
    }

    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = batches::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|_| RepositoryError::DeleteError)?;
        Ok(result.rows_affected > 0)
    }
}

#[async_trait]
impl ListingStore for SeaOrmStore {
    async fn insert_one(&self, listing: ListingRecord) -> Result<(), RepositoryError> {
        listings::Entity::insert(listing.into_active_model())
            .exec(&*self.db)
            .await
            .map_err(|_| RepositoryError::StoreError)?;
        Ok(())
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<ListingRecord>, RepositoryError> {
        listings::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|_| RepositoryError::FetchError)
    }

    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = listings::Entity::delete_by_id(id)
            .exec(&*self.db)
            .await
            .map_err(|_| RepositoryError::DeleteError)?;
        Ok(result.rows_affected > 0)
    }
}

/// In-memory store used by tests. Keeps the same conditional-update
/// semantics as the SeaORM store, enforced under a write lock.
#[derive(Clone, Default)]
pub struct MockStore {
    pub tokens: Arc<RwLock<HashMap<String, SignTokenRecord>>>,
    pub batches: Arc<RwLock<HashMap<Uuid, BatchRecord>>>,
    pub listings: Arc<RwLock<HashMap<Uuid, ListingRecord>>>,
}

#[async_trait]
impl TokenStore for MockStore {
    async fn insert_many(&self, tokens: Vec<SignTokenRecord>) -> Result<(), RepositoryError> {
        let mut repo = self.tokens.write().unwrap();
        for token in tokens {
            repo.insert(token.activation_token.clone(), token);
        }
        Ok(())
    }

    async fn find_by_activation_token(
        &self,
        activation_token: &str,
    ) -> Result<Option<SignTokenRecord>, RepositoryError> {
        Ok(self.tokens.read().unwrap().get(activation_token).cloned())
    }

    async fn find_missing_assets(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<SignTokenRecord>, RepositoryError> {
        Ok(self
            .tokens
            .read()
            .unwrap()
            .values()
            .filter(|t| t.batch_id == batch_id && t.rendered_asset_path.is_none())
            .cloned()
            .collect())
    }

    async fn count_missing_assets(&self, batch_id: Uuid) -> Result<u64, RepositoryError> {
        Ok(self.find_missing_assets(batch_id).await?.len() as u64)
    }

    async fn status_counts(&self, batch_id: Uuid) -> Result<StatusCounts, RepositoryError> {
        let mut counts = StatusCounts::default();
        for token in self.tokens.read().unwrap().values() {
            if token.batch_id != batch_id {
                continue;
            }
            match token.status {
                SignStatus::Unassigned => counts.unassigned += 1,
                SignStatus::Sold => counts.sold += 1,
                SignStatus::Assigned => counts.assigned += 1,
            }
        }
        Ok(counts)
    }

    async fn mark_sold(
        &self,
        activation_token: &str,
        customer_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut repo = self.tokens.write().unwrap();
        match repo.get_mut(activation_token) {
            Some(token) if token.customer_id.is_none() => {
                token.customer_id = Some(customer_id.to_string());
                token.status = SignStatus::Sold;
                token.sold_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn bind_listing(
        &self,
        activation_token: &str,
        customer_id: &str,
        listing_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut repo = self.tokens.write().unwrap();
        match repo.get_mut(activation_token) {
            Some(token)
                if token.customer_id.as_deref() == Some(customer_id)
                    && token.listing_id.is_none() =>
            {
                token.listing_id = Some(listing_id);
                token.status = SignStatus::Assigned;
                token.assigned_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_rendered_asset_path(
        &self,
        id: Uuid,
        path: &str,
    ) -> Result<bool, RepositoryError> {
        let mut repo = self.tokens.write().unwrap();
        for token in repo.values_mut() {
            if token.id == id {
                token.rendered_asset_path = Some(path.to_string());
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl BatchStore for MockStore {
    async fn insert_one(&self, batch: BatchRecord) -> Result<(), RepositoryError> {
        self.batches.write().unwrap().insert(batch.id, batch);
        Ok(())
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<BatchRecord>, RepositoryError> {
        Ok(self.batches.read().unwrap().get(&id).cloned())
    }

    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.batches.write().unwrap().remove(&id).is_some())
    }
}

#[async_trait]
impl ListingStore for MockStore {
    async fn insert_one(&self, listing: ListingRecord) -> Result<(), RepositoryError> {
        self.listings.write().unwrap().insert(listing.id, listing);
        Ok(())
    }

    async fn find_one(&self, id: Uuid) -> Result<Option<ListingRecord>, RepositoryError> {
        Ok(self.listings.read().unwrap().get(&id).cloned())
    }

    async fn delete_one(&self, id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.listings.write().unwrap().remove(&id).is_some())
    }
}
