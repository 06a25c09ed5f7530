/// Application context and dependency injection
use crate::{
    account::deletion::DeletionManager,
    account::saga::SagaCoordinator,
    account::store::AccountStore,
    cache::{CounterStore, MemoryStore, RedisStore},
    captcha::CaptchaService,
    config::ServerConfig,
    error::AtlasResult,
    limit::AbuseGate,
    mailer::Mailer,
    shard::ShardRegistry,
    tenant::TenantRegistry,
    token::TokenIssuer,
    uid::UidAllocator,
};
use std::sync::Arc;
use tracing::warn;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub shards: Arc<ShardRegistry>,
    pub counter: Arc<dyn CounterStore>,
    pub tenants: Arc<TenantRegistry>,
    pub store: Arc<AccountStore>,
    pub saga: Arc<SagaCoordinator>,
    pub deletion: Arc<DeletionManager>,
    pub gate: Arc<AbuseGate>,
    pub captcha: Arc<CaptchaService>,
    pub tokens: Arc<TokenIssuer>,
    pub uid: Arc<UidAllocator>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> AtlasResult<Self> {
        config.validate()?;

        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        let shards = Arc::new(ShardRegistry::open(&config.storage, &config.tenants).await?);

        let counter: Arc<dyn CounterStore> = if config.cache.redis_url.is_empty() {
            warn!(
                "no Redis URL configured, using the in-process counter store; \
                 counters and locks are not shared across instances"
            );
            Arc::new(MemoryStore::new())
        } else {
            let redis = RedisStore::connect(&config.cache.redis_url).await?;
            redis.ping().await?;
            Arc::new(redis)
        };

        let uid = Arc::new(UidAllocator::new(counter.clone()));
        uid.seed(config.cache.uid_seed).await?;

        let tenants = Arc::new(TenantRegistry::from_config(&config));
        let store = Arc::new(AccountStore::new(shards.clone(), counter.clone()));
        let tokens = Arc::new(TokenIssuer::new(
            config.auth.jwt_secret.clone(),
            config.auth.access_token_ttl_secs,
            config.auth.refresh_token_ttl_secs,
        ));
        let saga = Arc::new(SagaCoordinator::new(
            shards.clone(),
            store.clone(),
            uid.clone(),
            tokens.clone(),
        ));
        let deletion = Arc::new(DeletionManager::new(
            shards.clone(),
            store.clone(),
            tenants.clone(),
        ));
        let gate = Arc::new(AbuseGate::new(counter.clone(), config.rate_limit.clone()));
        let captcha = Arc::new(CaptchaService::new(counter.clone()));
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config: Arc::new(config),
            shards,
            counter,
            tenants,
            store,
            saga,
            deletion,
            gate,
            captcha,
            tokens,
            uid,
            mailer,
        })
    }
}
