/// Counter/lock store for rate limits, UID allocation, verification codes
/// and CAPTCHA answers.
///
/// All mutations are atomic set-if-absent or increment; nothing here is
/// read-then-write, so many service instances can share one store safely.
/// The Redis backend is the deployment target; the in-memory backend exists
/// for tests and single-instance development.

pub mod memory;

use crate::error::{AtlasError, AtlasResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, error, info};

pub use memory::MemoryStore;

/// Key prefixes shared with other deployed instances; never change these.
pub mod keys {
    pub const UID_COUNTER: &str = "_account_auto_increment_uid";
    pub const LIMIT_IP: &str = "_account_limit_ip_";
    pub const LIMIT_IP_LOCK: &str = "_account_limit_lock_ip_";
    pub const LIMIT_LOGIN_ACCOUNT: &str = "_account_limit_l_";
    pub const LIMIT_LOGIN_IP_LOCK: &str = "_account_limit_li_";
    pub const LIMIT_CODE_ACCOUNT: &str = "_account_limit_vc_";
    pub const LIMIT_CODE_IP: &str = "_account_limit_vci_";
    pub const LIMIT_CODE_IP_LOCK: &str = "_account_limit_vcil_";
    pub const LIMIT_REGISTER_IP: &str = "_account_limit_ri_";
    pub const LIMIT_REGISTER_IP_LOCK: &str = "_account_limit_ril_";
    pub const VERIFY_CODE: &str = "_account_code_";
    pub const CAPTCHA: &str = "_account_captcha_";
}

/// Counter/lock store operations used by the service core.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Set `key` to `value` only if absent. Returns whether the set won.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<bool>;

    /// Set `key` unconditionally.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<()>;

    /// Atomically increment `key`; when the increment creates the key and a
    /// TTL is given, the TTL is applied.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> AtlasResult<i64>;

    async fn get(&self, key: &str) -> AtlasResult<Option<String>>;

    /// Delete `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> AtlasResult<bool>;

    async fn exists(&self, key: &str) -> AtlasResult<bool>;

    /// Remaining TTL in seconds, None when the key has no expiry or is absent.
    async fn ttl(&self, key: &str) -> AtlasResult<Option<i64>>;
}

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> AtlasResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = Client::open(redis_url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            AtlasError::Cache(e)
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            AtlasError::Cache(e)
        })?;

        info!("Redis connection established");
        Ok(Self { connection })
    }

    pub async fn ping(&self) -> AtlasResult<()> {
        let mut conn = self.connection.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(AtlasError::Internal("unexpected Redis PING response".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<bool> {
        let mut conn = self.connection.clone();
        let won: bool = match ttl {
            Some(ttl) => {
                let result: Option<String> = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(ttl.as_secs())
                    .query_async(&mut conn)
                    .await?;
                result.is_some()
            }
            None => conn.set_nx(key, value).await?,
        };
        debug!("SETNX {} -> {}", key, won);
        Ok(won)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AtlasResult<()> {
        let mut conn = self.connection.clone();
        // The reply type must be pinned; leaving it to inference trips the
        // never-type fallback lint on newer compilers.
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> AtlasResult<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            if let Some(ttl) = ttl {
                let _: () = conn.expire(key, ttl.as_secs() as i64).await?;
            }
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> AtlasResult<Option<String>> {
        let mut conn = self.connection.clone();
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> AtlasResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> AtlasResult<bool> {
        let mut conn = self.connection.clone();
        Ok(conn.exists(key).await?)
    }

    async fn ttl(&self, key: &str) -> AtlasResult<Option<i64>> {
        let mut conn = self.connection.clone();
        let ttl: i64 = conn.ttl(key).await?;
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(ttl))
        }
    }
}
