pub mod error;
pub mod queries;
pub mod repository;

pub use migrations::Migrator;

/// Database migrations module
pub mod migrations {
    use sea_orm_migration::prelude::*;

    /// Main migrator struct for database migrations
    pub struct Migrator;

    #[async_trait::async_trait]
    impl MigratorTrait for Migrator {
        fn migrations() -> Vec<Box<dyn MigrationTrait>> {
            vec![Box::new(tables::Migration)]
        }
    }

    /// Database tables module containing table creation migrations
    pub mod tables {
        use super::*;

        /// Migration struct for creating database tables
        #[derive(DeriveMigrationName)]
        pub struct Migration;

        #[async_trait::async_trait]
        impl MigrationTrait for Migration {
            /// Creates the necessary database tables if they don't exist
            async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                // Generation batches holding shared print metadata
                manager
                    .create_table(
                        Table::create()
                            .table(Batches::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(Batches::Id)
                                    .uuid()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(Batches::Language).string().not_null())
                            .col(ColumnDef::new(Batches::PropertyType).string().not_null())
                            .col(
                                ColumnDef::new(Batches::TransactionType)
                                    .string()
                                    .not_null(),
                            )
                            .col(ColumnDef::new(Batches::PhoneSpace).boolean().not_null())
                            .col(
                                ColumnDef::new(Batches::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                // Sign tokens, one row per physical printed sign
                manager
                    .create_table(
                        Table::create()
                            .table(SignTokens::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(SignTokens::Id)
                                    .uuid()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(
                                ColumnDef::new(SignTokens::ActivationToken)
                                    .string()
                                    .not_null()
                                    .unique_key(),
                            )
                            .col(
                                ColumnDef::new(SignTokens::Status)
                                    .string_len(16)
                                    .not_null(),
                            )
                            .col(ColumnDef::new(SignTokens::CustomerId).string())
                            .col(ColumnDef::new(SignTokens::ListingId).uuid())
                            .col(ColumnDef::new(SignTokens::BatchId).uuid().not_null())
                            .col(ColumnDef::new(SignTokens::RenderedAssetPath).string())
                            .col(
                                ColumnDef::new(SignTokens::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(SignTokens::SoldAt).timestamp_with_time_zone(),
                            )
                            .col(
                                ColumnDef::new(SignTokens::AssignedAt)
                                    .timestamp_with_time_zone(),
                            )
                            .to_owned(),
                    )
                    .await?;

                manager
                    .create_index(
                        Index::create()
                            .name("idx_sign_tokens_batch_id")
                            .table(SignTokens::Table)
                            .col(SignTokens::BatchId)
                            .if_not_exists()
                            .to_owned(),
                    )
                    .await?;

                // Listing shells created as a side effect of binding
                manager
                    .create_table(
                        Table::create()
                            .table(Listings::Table)
                            .if_not_exists()
                            .col(
                                ColumnDef::new(Listings::Id)
                                    .uuid()
                                    .not_null()
                                    .primary_key(),
                            )
                            .col(ColumnDef::new(Listings::OwnerId).string().not_null())
                            .col(ColumnDef::new(Listings::Status).string().not_null())
                            .col(ColumnDef::new(Listings::Language).string().not_null())
                            .col(ColumnDef::new(Listings::PropertyType).string().not_null())
                            .col(
                                ColumnDef::new(Listings::TransactionType)
                                    .string()
                                    .not_null(),
                            )
                            .col(
                                ColumnDef::new(Listings::CreatedAt)
                                    .timestamp_with_time_zone()
                                    .not_null(),
                            )
                            .to_owned(),
                    )
                    .await?;

                Ok(())
            }

            /// Drops the database tables
            async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
                manager
                    .drop_table(Table::drop().table(Listings::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(SignTokens::Table).to_owned())
                    .await?;
                manager
                    .drop_table(Table::drop().table(Batches::Table).to_owned())
                    .await?;
                Ok(())
            }
        }

        #[derive(Iden)]
        enum Batches {
            Table,
            Id,
            Language,
            PropertyType,
            TransactionType,
            PhoneSpace,
            CreatedAt,
        }

        #[derive(Iden)]
        enum SignTokens {
            Table,
            Id,
            ActivationToken,
            Status,
            CustomerId,
            ListingId,
            BatchId,
            RenderedAssetPath,
            CreatedAt,
            SoldAt,
            AssignedAt,
        }

        #[derive(Iden)]
        enum Listings {
            Table,
            Id,
            OwnerId,
            Status,
            Language,
            PropertyType,
            TransactionType,
            CreatedAt,
        }
    }
}
