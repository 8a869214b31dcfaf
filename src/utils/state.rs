use std::{collections::HashMap, sync::Arc, time::Duration};

use aws_config::{BehaviorVersion, Region};
use color_eyre::eyre::Context;
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use secrecy::ExposeSecret;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    claims::ClaimOrchestrator,
    config::Config,
    database::{
        queries::SeaOrmStore,
        repository::{BatchStore, TokenStore},
    },
    render::{AwsS3Blobs, BatchPoller, HttpRenderClient, RenderPipeline},
    session::{AuthProvider, HttpAuthProvider, MemoryVault, RedisVault, SessionContinuity},
    tokens::TokenGenerator,
    utils::cache::Cache,
};

/// Public URL roots the handlers embed into responses and redirects.
pub struct PublicUrls {
    pub activation_base: String,
    pub listing_base: String,
    pub payment_checkout: String,
}

impl PublicUrls {
    pub fn listing_url(&self, listing_id: Uuid) -> String {
        format!("{}/{listing_id}", self.listing_base.trim_end_matches('/'))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub token_store: Arc<dyn TokenStore>,
    pub batch_store: Arc<dyn BatchStore>,
    pub claims: Arc<ClaimOrchestrator>,
    pub generator: Arc<TokenGenerator>,
    pub render: Arc<RenderPipeline>,
    /// One reconciliation poller per batch; replacing an entry cancels
    /// the previous poller.
    pub pollers: Arc<RwLock<HashMap<Uuid, BatchPoller>>>,
    pub sessions: Arc<SessionContinuity>,
    pub auth: Arc<dyn AuthProvider>,
    pub cache: Cache,
    pub urls: Arc<PublicUrls>,
    pub completion_wait: Duration,
    pub poll_interval: Duration,
}

pub async fn setup(config: &Config) -> color_eyre::Result<AppState> {
    let db: DatabaseConnection = Database::connect(config.database.url.expose_secret())
        .await
        .wrap_err("Failed to connect to database")?;

    crate::database::Migrator::up(&db, None)
        .await
        .wrap_err("Failed to apply migrations")?;

    let store = Arc::new(SeaOrmStore::new(Arc::new(db)));
    let token_store: Arc<dyn TokenStore> = store.clone();
    let batch_store: Arc<dyn BatchStore> = store.clone();

    let aws_config = aws_config::defaults(BehaviorVersion::v2025_01_17())
        .region(Region::new(config.aws.region.clone()))
        .load()
        .await;
    let blobs = Arc::new(AwsS3Blobs::new(
        &aws_config,
        config.blob.bucket.clone(),
        config.blob.public_base_url.clone(),
    ));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.renderer.timeout_secs))
        .build()
        .wrap_err("Failed to build HTTP client")?;

    let auth: Arc<dyn AuthProvider> = Arc::new(HttpAuthProvider::new(
        http.clone(),
        config.auth.base_url.clone(),
        config.auth.api_key.clone(),
    ));

    let redis_conn = config
        .redis
        .start()
        .await
        .wrap_err("Failed to connect to Redis")?;
    let sessions = Arc::new(SessionContinuity::new(
        Arc::new(MemoryVault::default()),
        Arc::new(RedisVault::new(redis_conn).with_ttl(config.session.backup_ttl)),
        Arc::clone(&auth),
        Duration::from_secs(config.session.provider_timeout_secs),
    ));

    let claims = Arc::new(ClaimOrchestrator::new(
        Arc::clone(&token_store),
        Arc::clone(&batch_store),
        store.clone(),
    ));
    let generator = Arc::new(TokenGenerator::new(
        Arc::clone(&token_store),
        Arc::clone(&batch_store),
    ));
    let render = Arc::new(RenderPipeline::new(
        Arc::new(HttpRenderClient::new(http, config.renderer.webhook_url.clone())),
        blobs,
        Arc::clone(&token_store),
        Arc::clone(&batch_store),
        config.urls.activation_base.clone(),
    ));

    Ok(AppState {
        token_store,
        batch_store,
        claims,
        generator,
        render,
        pollers: Arc::new(RwLock::new(HashMap::new())),
        sessions,
        auth,
        cache: Cache::new(config.cache.ttl, config.cache.max_capacity),
        urls: Arc::new(PublicUrls {
            activation_base: config.urls.activation_base.clone(),
            listing_base: config.urls.listing_base.clone(),
            payment_checkout: config.urls.payment_checkout.clone(),
        }),
        completion_wait: Duration::from_secs(config.session.completion_wait_secs),
        poll_interval: Duration::from_secs(config.renderer.poll_interval_secs),
    })
}
