/// Shard connection registry.
///
/// Every shard database gets its own pool, keyed by a stable connection key.
/// The registry is built once at startup and read-only afterwards; a lookup
/// miss means the partition topology and the configuration disagree, which
/// is fatal.
use crate::config::{StorageConfig, TenantConfig};
use crate::error::{AtlasError, AtlasResult};
use crate::shard::route;
use sqlx::sqlite::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

pub struct ShardRegistry {
    account: HashMap<u32, SqlitePool>,
    hash: HashMap<u32, SqlitePool>,
    game_user: HashMap<String, SqlitePool>,
}

fn game_user_key(game_id: i64, platform_id: i64, db_id: u32) -> String {
    format!("user_{}_{}_{}", game_id, platform_id, db_id)
}

impl ShardRegistry {
    /// Assemble a registry from already-opened pools. Schema bootstrap is
    /// the caller's responsibility.
    pub fn new(
        account: HashMap<u32, SqlitePool>,
        hash: HashMap<u32, SqlitePool>,
        game_user: HashMap<String, SqlitePool>,
    ) -> Self {
        Self { account, hash, game_user }
    }

    /// Open every shard database for the configured tenants and create the
    /// partitioned tables that do not exist yet.
    pub async fn open(storage: &StorageConfig, tenants: &[TenantConfig]) -> AtlasResult<Self> {
        let dir = &storage.data_directory;
        tokio::fs::create_dir_all(dir).await?;

        let mut account = HashMap::new();
        for db_id in 1..=route::ACCOUNT_DB_COUNT {
            let pool = create_pool(&dir.join(format!("account_{}.db", db_id)), storage).await?;
            bootstrap_account_schema(&pool).await?;
            account.insert(db_id, pool);
        }

        let mut hash = HashMap::new();
        for db_id in 1..=route::HASH_DB_COUNT {
            let pool = create_pool(&dir.join(format!("hash_{}.db", db_id)), storage).await?;
            bootstrap_hash_schema(&pool).await?;
            hash.insert(db_id, pool);
        }

        let mut game_user = HashMap::new();
        for tenant in tenants {
            for db_id in 1..=route::GAME_USER_DB_COUNT {
                let key = game_user_key(tenant.game_id, tenant.platform_id, db_id);
                let pool = create_pool(&dir.join(format!("{}.db", key)), storage).await?;
                bootstrap_game_user_schema(&pool).await?;
                game_user.insert(key, pool);
            }
        }

        info!(
            account_dbs = account.len(),
            hash_dbs = hash.len(),
            game_user_dbs = game_user.len(),
            "shard registry opened"
        );
        Ok(Self { account, hash, game_user })
    }

    /// Account pool routed by an identity string or decimal UID.
    pub fn account_pool(&self, key: &str) -> AtlasResult<&SqlitePool> {
        let db_id = route::account_db_id(key);
        self.account.get(&db_id).ok_or_else(|| {
            AtlasError::Config(format!("no account shard configured for db {}", db_id))
        })
    }

    /// Account pool routed by UID.
    pub fn account_pool_for_uid(&self, uid: i64) -> AtlasResult<&SqlitePool> {
        self.account_pool(&uid.to_string())
    }

    /// Hash-index pool routed by an identity string.
    pub fn hash_pool(&self, account: &str) -> AtlasResult<&SqlitePool> {
        let db_id = route::hash_db_id(account);
        self.hash.get(&db_id).ok_or_else(|| {
            AtlasError::Config(format!("no hash shard configured for db {}", db_id))
        })
    }

    /// Game-user pool for a tenant, routed by main UID.
    pub fn game_user_pool(
        &self,
        uid: i64,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<&SqlitePool> {
        self.game_user_pool_by_index(game_id, platform_id, route::game_user_db_id(uid))
    }

    /// Game-user pool addressed by explicit database index; used by the
    /// reconciler's full fan-out.
    pub fn game_user_pool_by_index(
        &self,
        game_id: i64,
        platform_id: i64,
        db_id: u32,
    ) -> AtlasResult<&SqlitePool> {
        let key = game_user_key(game_id, platform_id, db_id);
        self.game_user.get(&key).ok_or_else(|| {
            AtlasError::Config(format!("no game user shard configured for {}", key))
        })
    }
}

async fn create_pool(path: &Path, storage: &StorageConfig) -> AtlasResult<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(storage.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(AtlasError::Database)?;
    Ok(pool)
}

/// Create the account tables on one account shard.
pub async fn bootstrap_account_schema(pool: &SqlitePool) -> AtlasResult<()> {
    for n in 1..=route::ACCOUNT_TABLE_COUNT {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS account_{} (
                uid INTEGER PRIMARY KEY,
                email TEXT NOT NULL DEFAULT '-1',
                mobile TEXT NOT NULL DEFAULT '-1',
                user_name TEXT NOT NULL DEFAULT '-1',
                guest TEXT NOT NULL DEFAULT '-1',
                third TEXT NOT NULL DEFAULT '-1',
                password TEXT NOT NULL DEFAULT '',
                salt TEXT NOT NULL DEFAULT '',
                type INTEGER NOT NULL,
                name TEXT NOT NULL DEFAULT '',
                card_id TEXT NOT NULL DEFAULT '',
                status INTEGER NOT NULL DEFAULT 1,
                created_time INTEGER NOT NULL,
                updated_time INTEGER NOT NULL
            )",
            n
        );
        sqlx::query(&ddl).execute(pool).await?;
    }
    Ok(())
}

/// Create the identity hash-index tables on one hash shard.
pub async fn bootstrap_hash_schema(pool: &SqlitePool) -> AtlasResult<()> {
    for n in 1..=route::HASH_TABLE_COUNT {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS account_hash_{} (
                account TEXT PRIMARY KEY,
                uid INTEGER NOT NULL
            )",
            n
        );
        sqlx::query(&ddl).execute(pool).await?;
    }
    Ok(())
}

/// Create the game-user and deletion-application tables on one tenant shard.
pub async fn bootstrap_game_user_schema(pool: &SqlitePool) -> AtlasResult<()> {
    for n in 1..=route::GAME_USER_TABLE_COUNT {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS user_{} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uid INTEGER NOT NULL,
                main_uid INTEGER NOT NULL,
                account TEXT NOT NULL UNIQUE,
                type INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                platform_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                created_time INTEGER NOT NULL,
                updated_time INTEGER NOT NULL
            )",
            n
        );
        sqlx::query(&ddl).execute(pool).await?;
    }
    for n in 1..=route::DELETE_APPLY_TABLE_COUNT {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS user_delete_apply_{} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uid INTEGER NOT NULL,
                main_uid INTEGER NOT NULL,
                account TEXT NOT NULL,
                type INTEGER NOT NULL,
                game_id INTEGER NOT NULL,
                platform_id INTEGER NOT NULL,
                status INTEGER NOT NULL DEFAULT 1,
                apply_time INTEGER NOT NULL,
                execute_delete_time INTEGER NOT NULL,
                ext_info TEXT NOT NULL DEFAULT ''
            )",
            n
        );
        sqlx::query(&ddl).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    /// In-memory registry covering one tenant, for tests.
    pub async fn memory_registry(game_id: i64, platform_id: i64) -> ShardRegistry {
        memory_registry_for(&[(game_id, platform_id)]).await
    }

    /// In-memory registry covering several tenants, each with its own
    /// game-user databases.
    pub async fn memory_registry_for(tenants: &[(i64, i64)]) -> ShardRegistry {
        let mut account = HashMap::new();
        for db_id in 1..=route::ACCOUNT_DB_COUNT {
            let pool = memory_pool().await;
            bootstrap_account_schema(&pool).await.unwrap();
            account.insert(db_id, pool);
        }
        let mut hash = HashMap::new();
        for db_id in 1..=route::HASH_DB_COUNT {
            let pool = memory_pool().await;
            bootstrap_hash_schema(&pool).await.unwrap();
            hash.insert(db_id, pool);
        }
        let mut game_user = HashMap::new();
        for &(game_id, platform_id) in tenants {
            for db_id in 1..=route::GAME_USER_DB_COUNT {
                let pool = memory_pool().await;
                bootstrap_game_user_schema(&pool).await.unwrap();
                game_user.insert(game_user_key(game_id, platform_id, db_id), pool);
            }
        }
        ShardRegistry::new(account, hash, game_user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_shard_is_a_config_error() {
        let registry = ShardRegistry::new(HashMap::new(), HashMap::new(), HashMap::new());
        match registry.account_pool("user@example.com") {
            Err(AtlasError::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
        match registry.game_user_pool(42, 100001, 101) {
            Err(AtlasError::Config(_)) => {}
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn open_bootstraps_shards_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageConfig {
            data_directory: dir.path().to_path_buf(),
            max_connections: 2,
        };
        let tenant = TenantConfig {
            game_id: 100001,
            platform_id: 101,
            delete_cooldown_days: 7,
            third_party: None,
        };

        let registry = ShardRegistry::open(&storage, &[tenant]).await.unwrap();
        let pool = registry.account_pool("opener@example.com").unwrap();
        sqlx::query("INSERT INTO account_1 (uid, type, created_time, updated_time) VALUES (1, 1, 0, 0)")
            .execute(pool)
            .await
            .unwrap();
        assert!(registry.game_user_pool(1, 100001, 101).is_ok());
    }

    #[tokio::test]
    async fn memory_registry_resolves_every_route() {
        let registry = testing::memory_registry(100001, 101).await;
        for i in 0..20 {
            let identity = format!("sample-{}@example.com", i);
            assert!(registry.account_pool(&identity).is_ok());
            assert!(registry.hash_pool(&identity).is_ok());
            assert!(registry.game_user_pool(1_000 + i, 100001, 101).is_ok());
        }
    }
}
