use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle of a physical sign token. Transitions only ever move
/// forward: `Unassigned -> Sold -> Assigned`.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum SignStatus {
    #[sea_orm(string_value = "unassigned")]
    Unassigned,
    #[sea_orm(string_value = "sold")]
    Sold,
    #[sea_orm(string_value = "assigned")]
    Assigned,
}

/// Listing shells are always created in draft status; the rest of the
/// listing lifecycle is owned by the main application.
pub const LISTING_STATUS_DRAFT: &str = "draft";

// Generation batches entity
pub mod batches {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "batches")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub language: String,
        pub property_type: String,
        pub transaction_type: String,
        pub phone_space: bool,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Sign tokens entity
pub mod sign_tokens {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "sign_tokens")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(unique)]
        pub activation_token: String,
        pub status: SignStatus,
        pub customer_id: Option<String>,
        pub listing_id: Option<Uuid>,
        pub batch_id: Uuid,
        pub rendered_asset_path: Option<String>,
        pub created_at: DateTimeUtc,
        pub sold_at: Option<DateTimeUtc>,
        pub assigned_at: Option<DateTimeUtc>,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

// Listing shells entity
pub mod listings {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "listings")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        pub owner_id: String,
        pub status: String,
        pub language: String,
        pub property_type: String,
        pub transaction_type: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub type BatchRecord = batches::Model;
pub type SignTokenRecord = sign_tokens::Model;
pub type ListingRecord = listings::Model;

impl ListingRecord {
    /// A draft listing shell prefilled from the batch print metadata.
    pub fn shell(owner_id: &str, batch: &BatchRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            status: LISTING_STATUS_DRAFT.to_string(),
            language: batch.language.clone(),
            property_type: batch.property_type.clone(),
            transaction_type: batch.transaction_type.clone(),
            created_at: chrono::Utc::now(),
        }
    }
}

/// Print metadata shared by every token of a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSpec {
    pub language: String,
    pub property_type: String,
    pub transaction_type: String,
    pub phone_space: bool,
}

/// Derived per-batch token counts; never stored, always recomputed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub unassigned: u64,
    pub sold: u64,
    pub assigned: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.unassigned + self.sold + self.assigned
    }
}

/// Backed-up authentication credentials carried across the payment
/// redirect (see the session module).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}
