/// Row-level access to the sharded account, hash and game-user tables.
///
/// Everything here is single-shard: lookups, password handling and
/// verification codes. Multi-shard writes live in the saga module.
use std::sync::Arc;
use std::time::Duration;

use md5::{Digest, Md5};
use rand::Rng;
use sqlx::Row;
use tracing::warn;

use crate::account::types::{
    self, AccountRecord, BindInfo, GameUserRecord, ACCOUNT_THIRD, NO_VALUE, STATUS_NORMAL,
};
use crate::cache::{keys, CounterStore};
use crate::codes;
use crate::error::{AtlasError, AtlasResult};
use crate::shard::{route, ShardRegistry};

const SALT_LEN: usize = 16;
const SALT_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const VERIFY_CODE_TTL_SECS: u64 = 300;

pub struct AccountStore {
    shards: Arc<ShardRegistry>,
    cache: Arc<dyn CounterStore>,
}

impl AccountStore {
    pub fn new(shards: Arc<ShardRegistry>, cache: Arc<dyn CounterStore>) -> Self {
        Self { shards, cache }
    }

    /// Resolve an identity string to a main uid through the hash index.
    pub async fn get_uid_by_account(&self, account: &str) -> AtlasResult<Option<i64>> {
        let pool = self.shards.hash_pool(account)?;
        let table = route::hash_table(account);
        let sql = format!("SELECT uid FROM {table} WHERE account = ?");
        let row = sqlx::query(&sql).bind(account).fetch_optional(pool).await?;
        Ok(row.map(|r| r.try_get("uid")).transpose()?)
    }

    /// Fetch the account row for a main uid.
    pub async fn get_account(&self, uid: i64) -> AtlasResult<Option<AccountRecord>> {
        let pool = self.shards.account_pool_for_uid(uid)?;
        let table = route::account_table(uid);
        let sql = format!("SELECT * FROM {table} WHERE uid = ?");
        let row = sqlx::query(&sql).bind(uid).fetch_optional(pool).await?;
        row.map(|r| AccountRecord::from_row(&r)).transpose().map_err(Into::into)
    }

    /// Account lookup by identity string, via the hash index.
    pub async fn get_account_by_identity(
        &self,
        account: &str,
    ) -> AtlasResult<Option<AccountRecord>> {
        match self.get_uid_by_account(account).await? {
            Some(uid) => self.get_account(uid).await,
            None => Ok(None),
        }
    }

    /// All game users attached to a main uid in one tenant's user space.
    pub async fn get_game_users(
        &self,
        main_uid: i64,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<Vec<GameUserRecord>> {
        let pool = self.shards.game_user_pool(main_uid, game_id, platform_id)?;
        let table = route::game_user_table(main_uid);
        let sql = format!("SELECT * FROM {table} WHERE main_uid = ?");
        let rows = sqlx::query(&sql).bind(main_uid).fetch_all(pool).await?;
        rows.iter()
            .map(|r| GameUserRecord::from_row(r).map_err(Into::into))
            .collect()
    }

    pub async fn get_game_user(
        &self,
        main_uid: i64,
        account: &str,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<Option<GameUserRecord>> {
        let pool = self.shards.game_user_pool(main_uid, game_id, platform_id)?;
        let table = route::game_user_table(main_uid);
        let sql = format!("SELECT * FROM {table} WHERE main_uid = ? AND account = ?");
        let row = sqlx::query(&sql)
            .bind(main_uid)
            .bind(account)
            .fetch_optional(pool)
            .await?;
        row.map(|r| GameUserRecord::from_row(&r)).transpose().map_err(Into::into)
    }

    /// Re-create a missing game-user row. Login uses this to self-heal a
    /// registration whose final commit was lost.
    pub async fn insert_game_user(
        &self,
        uid: i64,
        main_uid: i64,
        account: &str,
        account_type: i32,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<()> {
        let pool = self.shards.game_user_pool(main_uid, game_id, platform_id)?;
        let table = route::game_user_table(main_uid);
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO {table} \
             (uid, main_uid, account, type, game_id, platform_id, status, created_time, updated_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        );
        sqlx::query(&sql)
            .bind(uid)
            .bind(main_uid)
            .bind(account)
            .bind(account_type)
            .bind(game_id)
            .bind(platform_id)
            .bind(STATUS_NORMAL)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Bound-identity summary for an account row plus its game users.
    pub async fn bind_info(
        &self,
        record: &AccountRecord,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<BindInfo> {
        let mut info = BindInfo::default();
        if let Some(email) = record.slot(types::ACCOUNT_EMAIL) {
            info.email = email.to_string();
        }
        if let Some(mobile) = record.slot(types::ACCOUNT_MOBILE) {
            info.mobile = mobile.to_string();
        }
        if let Some(user_name) = record.slot(types::ACCOUNT_USERNAME) {
            info.user_name = user_name.to_string();
        }
        // Third-party identities are tenant-scoped, read from the user space.
        let users = self.get_game_users(record.uid, game_id, platform_id).await?;
        for user in users {
            if user.account_type == ACCOUNT_THIRD {
                if let Some((provider, _)) = types::parse_third_identity(&user.account) {
                    info.thirds.push(provider.to_string());
                }
            }
        }
        Ok(info)
    }

    /// Rotate the password hash. `failure_code` lets the forget and change
    /// flows report their own wire code for a missed row.
    pub async fn update_password(
        &self,
        uid: i64,
        password: &str,
        failure_code: i32,
    ) -> AtlasResult<()> {
        let pool = self.shards.account_pool_for_uid(uid)?;
        let table = route::account_table(uid);
        let salt = gen_salt();
        let hashed = hash_password(password, &salt);
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "UPDATE {table} SET password = ?, salt = ?, updated_time = ? WHERE uid = ?"
        );
        let result = sqlx::query(&sql)
            .bind(&hashed)
            .bind(&salt)
            .bind(now)
            .bind(uid)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AtlasError::op(
                failure_code,
                format!("password update touched no row, uid {uid}"),
            ));
        }
        Ok(())
    }

    /// Attach a verified real-name identity to an account. One-shot: a row
    /// that already carries a card id is not overwritten.
    pub async fn set_real_name(&self, uid: i64, name: &str, card_id: &str) -> AtlasResult<()> {
        let pool = self.shards.account_pool_for_uid(uid)?;
        let table = route::account_table(uid);
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "UPDATE {table} SET name = ?, card_id = ?, updated_time = ? \
             WHERE uid = ? AND card_id = ''"
        );
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(card_id)
            .bind(now)
            .bind(uid)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AtlasError::op(
                codes::REAL_NAME_UPDATE_ERROR,
                format!("real-name already set, uid {uid}"),
            ));
        }
        Ok(())
    }

    // Verification codes are stored as `_account_code_{purpose}_{account}`
    // with a fixed TTL and consumed on use.

    pub async fn put_verify_code(
        &self,
        purpose: i32,
        account: &str,
        code: &str,
    ) -> AtlasResult<()> {
        let key = verify_code_key(purpose, account);
        self.cache
            .set(&key, code, Some(Duration::from_secs(VERIFY_CODE_TTL_SECS)))
            .await?;
        Ok(())
    }

    pub async fn check_verify_code(
        &self,
        purpose: i32,
        account: &str,
        code: &str,
    ) -> AtlasResult<()> {
        let key = verify_code_key(purpose, account);
        match self.cache.get(&key).await? {
            Some(stored) if stored == code => Ok(()),
            Some(_) => Err(AtlasError::op(
                codes::VERIFY_CODE_ERROR,
                format!("verify code mismatch, purpose {purpose}"),
            )),
            None => Err(AtlasError::op(
                codes::VERIFY_CODE_NOT_EXISTS,
                format!("verify code missing, purpose {purpose}"),
            )),
        }
    }

    pub async fn consume_verify_code(&self, purpose: i32, account: &str) {
        let key = verify_code_key(purpose, account);
        if let Err(err) = self.cache.delete(&key).await {
            warn!("failed to drop consumed verify code: {err}");
        }
    }
}

fn verify_code_key(purpose: i32, account: &str) -> String {
    format!("{}{}_{}", keys::VERIFY_CODE, purpose, account)
}

/// Random 16-character alphanumeric salt.
pub fn gen_salt() -> String {
    let mut rng = rand::thread_rng();
    (0..SALT_LEN)
        .map(|_| SALT_CHARSET[rng.gen_range(0..SALT_CHARSET.len())] as char)
        .collect()
}

/// Stored password digest: md5 over the plaintext concatenated with the salt.
/// Kept for compatibility with existing account rows.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(record: &AccountRecord, password: &str) -> bool {
    if record.password.is_empty() {
        return false;
    }
    hash_password(password, &record.salt) == record.password
}

/// Random numeric verification code.
pub fn gen_verify_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

/// Identity value shown to clients, with the middle masked.
pub fn mask_identity(value: &str) -> String {
    if value == NO_VALUE || value.len() < 4 {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    let keep = 2.min(chars.len() / 4).max(1);
    let head: String = chars[..keep].iter().collect();
    let tail: String = chars[chars.len() - keep..].iter().collect();
    format!("{head}****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryStore;
    use crate::shard::registry::testing::memory_registry;

    async fn store() -> AccountStore {
        let shards = Arc::new(memory_registry(1001, 1).await);
        AccountStore::new(shards, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn salt_shape() {
        let salt = gen_salt();
        assert_eq!(salt.len(), 16);
        assert!(salt.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn password_round_trip() {
        let salt = gen_salt();
        let hashed = hash_password("s3cret!", &salt);
        assert_eq!(hashed.len(), 32);
        assert_eq!(hash_password("s3cret!", &salt), hashed);
        assert_ne!(hash_password("other", &salt), hashed);
    }

    #[test]
    fn masking() {
        assert_eq!(mask_identity("-1"), "-1");
        assert_eq!(mask_identity("user@example.com"), "us****om");
        assert_eq!(mask_identity("abc"), "abc");
    }

    #[tokio::test]
    async fn missing_account_is_none() {
        let store = store().await;
        assert!(store.get_account(42).await.unwrap().is_none());
        assert!(store.get_uid_by_account("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn game_user_insert_and_fetch() {
        let store = store().await;
        // Composite uid for account 1 under tenant 1001/1, raw uid as main.
        store
            .insert_game_user(10010010000000001, 1, "g-abc", 4, 1001, 1)
            .await
            .unwrap();
        let users = store.get_game_users(1, 1001, 1).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].uid, 10010010000000001);
        assert_eq!(users[0].main_uid, 1);
        assert_eq!(users[0].account, "g-abc");
        assert_eq!(users[0].status, STATUS_NORMAL);
        let one = store.get_game_user(1, "g-abc", 1001, 1).await.unwrap();
        assert!(one.is_some());
    }

    #[tokio::test]
    async fn verify_code_lifecycle() {
        let store = store().await;
        store.put_verify_code(1, "user@example.com", "123456").await.unwrap();
        store
            .check_verify_code(1, "user@example.com", "123456")
            .await
            .unwrap();
        let err = store
            .check_verify_code(1, "user@example.com", "000000")
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::VERIFY_CODE_ERROR);
        store.consume_verify_code(1, "user@example.com").await;
        let err = store
            .check_verify_code(1, "user@example.com", "123456")
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::VERIFY_CODE_NOT_EXISTS);
    }
}
