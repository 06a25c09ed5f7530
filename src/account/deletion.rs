/// Deferred account deletion and recovery.
///
/// A deletion request does not delete anything. It snapshots the tenant's
/// game-user rows into the apply table, marks the live rows `Deleting` and
/// schedules a hard delete after the tenant's cooldown. During the cooldown
/// the owner can undo, which flags the application for the recovery pass.
/// A background reconciler walks every apply table and settles both
/// directions; claims are conditional updates on the status column so any
/// number of service instances can run the reconciler concurrently.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use tracing::{error, info, warn};

use crate::account::store::AccountStore;
use crate::account::types::{
    self, APPLY_DELETED, APPLY_PENDING, APPLY_RECOVER, APPLY_RECOVER_SUCCESS, APPLY_SUCCESS,
    STATUS_DELETING, STATUS_NORMAL,
};
use crate::codes;
use crate::error::{AtlasError, AtlasResult};
use crate::shard::{route, ShardRegistry};
use crate::tenant::{GameConfig, TenantRegistry};
use crate::uid;

const SECS_PER_DAY: i64 = 86_400;

/// Which application rows a state transition claims.
#[derive(Debug, Clone, Copy)]
enum ClaimKey<'a> {
    Uid(i64),
    MainUid(i64),
    Account(&'a str),
}

/// Attempt the state transition `from -> to` on the application rows
/// matching `key`, optionally requiring the scheduled time to have passed.
/// The conditional update is the only cross-instance lock: the affected-row
/// count tells the caller whether it owns the transition.
async fn claim_transition<'e, E>(
    executor: E,
    apply_table: &str,
    key: ClaimKey<'_>,
    from: i32,
    to: i32,
    due_before: Option<i64>,
) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let column = match key {
        ClaimKey::Uid(_) => "uid",
        ClaimKey::MainUid(_) => "main_uid",
        ClaimKey::Account(_) => "account",
    };
    let sql = match due_before {
        Some(_) => format!(
            "UPDATE {apply_table} SET status = ? \
             WHERE {column} = ? AND status = ? AND execute_delete_time < ?"
        ),
        None => format!(
            "UPDATE {apply_table} SET status = ? WHERE {column} = ? AND status = ?"
        ),
    };
    let mut query = sqlx::query(&sql).bind(to);
    query = match key {
        ClaimKey::Uid(v) | ClaimKey::MainUid(v) => query.bind(v),
        ClaimKey::Account(a) => query.bind(a),
    };
    query = query.bind(from);
    if let Some(deadline) = due_before {
        query = query.bind(deadline);
    }
    Ok(query.execute(executor).await?.rows_affected())
}

/// Client-supplied third-party details accompanying a deletion request.
#[derive(Debug, Deserialize)]
pub struct ThirdInfo {
    pub third_id: i64,
    #[serde(default)]
    pub authorization_code: String,
}

/// Opaque extra state carried on the apply row, used after the hard delete.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ApplyExt {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    revoke_token: String,
}

pub struct DeletionManager {
    shards: Arc<ShardRegistry>,
    store: Arc<AccountStore>,
    tenants: Arc<TenantRegistry>,
    http: reqwest::Client,
}

impl DeletionManager {
    pub fn new(
        shards: Arc<ShardRegistry>,
        store: Arc<AccountStore>,
        tenants: Arc<TenantRegistry>,
    ) -> Self {
        Self {
            shards,
            store,
            tenants,
            http: reqwest::Client::new(),
        }
    }

    /// File a deletion application. Returns the scheduled hard-delete time.
    pub async fn apply(
        &self,
        uid: i64,
        account: &str,
        game_id: i64,
        platform_id: i64,
        third_info: Option<&str>,
    ) -> AtlasResult<i64> {
        let main_uid = self
            .store
            .get_uid_by_account(account)
            .await?
            .ok_or_else(|| {
                AtlasError::op(
                    codes::DELETE_ACCOUNT_NOT_EXISTS,
                    format!("deletion for unknown identity, uid {uid}"),
                )
            })?;
        // The caller presents the composite tenant uid; it must recompose
        // from the identity's real owner.
        if uid != uid::compose_tenant_uid(main_uid, game_id, platform_id)? {
            return Err(AtlasError::op(
                codes::DELETE_ACCOUNT_AND_UID_NOT_MATCH,
                format!("identity owned by {main_uid}, requested by {uid}"),
            ));
        }

        let pool = self.shards.game_user_pool(main_uid, game_id, platform_id)?;
        let apply_table = route::delete_apply_table(main_uid);
        let user_table = route::game_user_table(main_uid);

        let open = sqlx::query(&format!(
            "SELECT uid FROM {apply_table} WHERE main_uid = ? AND status IN (?, ?, ?) LIMIT 1"
        ))
        .bind(main_uid)
        .bind(APPLY_PENDING)
        .bind(APPLY_SUCCESS)
        .bind(APPLY_RECOVER)
        .fetch_optional(pool)
        .await?;
        if open.is_some() {
            return Err(AtlasError::op(
                codes::DELETE_APPLY_ALREADY_EXISTS,
                format!("open deletion application for {main_uid}"),
            ));
        }

        let config = self.tenants.game(game_id, platform_id).ok_or_else(|| {
            AtlasError::op(codes::GAME_ID_NOT_EXISTS, format!("tenant {game_id}/{platform_id}"))
        })?;

        // Token exchange with the provider happens before the snapshot so the
        // revoke token rides on the apply row; a failed exchange only loses
        // the later revoke, never the deletion.
        let ext = match third_info {
            Some(raw) => self.exchange_revoke_token(raw, &config).await,
            None => ApplyExt::default(),
        };
        let ext_json = serde_json::to_string(&ext)
            .map_err(|e| AtlasError::Internal(format!("ext encode: {e}")))?;

        let now = chrono::Utc::now().timestamp();
        let execute_delete_time = now + config.delete_cooldown_days * SECS_PER_DAY;

        let mut tx = pool.begin().await?;
        let copied = sqlx::query(&format!(
            "INSERT INTO {apply_table} \
             (uid, main_uid, account, type, game_id, platform_id, status, apply_time, execute_delete_time, ext_info) \
             SELECT uid, main_uid, account, type, game_id, platform_id, ?, ?, ?, ? \
             FROM {user_table} WHERE main_uid = ?"
        ))
        .bind(APPLY_PENDING)
        .bind(now)
        .bind(execute_delete_time)
        .bind(&ext_json)
        .bind(main_uid)
        .execute(&mut *tx)
        .await
        .map_err(|e| AtlasError::op(codes::ADD_DELETE_APPLY_ERROR, format!("snapshot: {e}")))?;
        if copied.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AtlasError::op(
                codes::DELETE_ACCOUNT_NOT_EXISTS,
                format!("no game users under {main_uid} in {game_id}/{platform_id}"),
            ));
        }

        sqlx::query(&format!(
            "UPDATE {user_table} SET status = ? WHERE main_uid = ? AND status = ?"
        ))
        .bind(STATUS_DELETING)
        .bind(main_uid)
        .bind(STATUS_NORMAL)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AtlasError::op(
                codes::DELETE_APPLY_UPDATE_USER_STATUS_ERROR,
                format!("status flip: {e}"),
            )
        })?;
        tx.commit().await?;

        info!(
            uid = main_uid,
            game_id,
            snapshot_rows = copied.rows_affected(),
            execute_delete_time,
            "deletion application filed"
        );
        Ok(execute_delete_time)
    }

    /// Undo a pending application. Only rows still inside the cooldown can be
    /// flagged for recovery; anything already claimed by the delete pass is
    /// past saving.
    pub async fn undo(
        &self,
        uid: i64,
        account: &str,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<()> {
        let main_uid = self
            .store
            .get_uid_by_account(account)
            .await?
            .ok_or_else(|| {
                AtlasError::op(
                    codes::UNDO_DELETE_ACCOUNT_NOT_EXISTS,
                    format!("undo for unknown identity, uid {uid}"),
                )
            })?;
        if uid != uid::compose_tenant_uid(main_uid, game_id, platform_id)? {
            return Err(AtlasError::op(
                codes::DELETE_ACCOUNT_AND_UID_NOT_MATCH,
                format!("identity owned by {main_uid}, requested by {uid}"),
            ));
        }

        let pool = self.shards.game_user_pool(main_uid, game_id, platform_id)?;
        let apply_table = route::delete_apply_table(main_uid);
        let flagged = claim_transition(
            pool,
            &apply_table,
            ClaimKey::MainUid(main_uid),
            APPLY_PENDING,
            APPLY_RECOVER,
            None,
        )
        .await?;
        if flagged == 0 {
            return Err(AtlasError::op(
                codes::UNDO_DELETE_APPLY_NOT_EXISTS,
                format!("no pending application for {main_uid}"),
            ));
        }
        info!(uid = main_uid, game_id, "deletion application undone");
        Ok(())
    }

    /// One reconciler sweep over every tenant, database and apply table.
    pub async fn reconcile_tick(&self) {
        let now = chrono::Utc::now().timestamp();
        for (game_id, platform_id) in self.tenants.tenants() {
            let config = match self.tenants.game(game_id, platform_id) {
                Some(c) => c,
                None => continue,
            };
            for db_id in 1..=route::GAME_USER_DB_COUNT {
                let pool = match self.shards.game_user_pool_by_index(game_id, platform_id, db_id) {
                    Ok(p) => p.clone(),
                    Err(err) => {
                        error!(game_id, platform_id, db_id, "reconciler missing pool: {err}");
                        continue;
                    }
                };
                for table_id in 1..=route::DELETE_APPLY_TABLE_COUNT {
                    if let Err(err) = self.delete_pass(&pool, table_id, &config, now).await {
                        error!(game_id, db_id, table_id, "delete pass failed: {err}");
                    }
                    if let Err(err) = self.recover_pass(&pool, table_id, now).await {
                        error!(game_id, db_id, table_id, "recover pass failed: {err}");
                    }
                }
            }
        }
    }

    /// Hard-delete every application whose cooldown has elapsed.
    pub(crate) async fn delete_pass(
        &self,
        pool: &SqlitePool,
        table_id: u32,
        config: &GameConfig,
        now: i64,
    ) -> AtlasResult<()> {
        let apply_table = format!("user_delete_apply_{table_id}");
        let rows = sqlx::query(&format!(
            "SELECT uid, main_uid, account, ext_info FROM {apply_table} \
             WHERE status = ? AND execute_delete_time < ?"
        ))
        .bind(APPLY_PENDING)
        .bind(now)
        .fetch_all(pool)
        .await?;

        for row in rows {
            let uid: i64 = row.try_get("uid")?;
            let main_uid: i64 = row.try_get("main_uid")?;
            let ext_info: String = row.try_get("ext_info")?;

            let mut tx = pool.begin().await?;
            // Whichever instance flips Pending first owns the row.
            let claimed = claim_transition(
                &mut *tx,
                &apply_table,
                ClaimKey::Uid(uid),
                APPLY_PENDING,
                APPLY_SUCCESS,
                Some(now),
            )
            .await?;
            if claimed < 1 {
                tx.rollback().await?;
                continue;
            }

            let user_table = route::game_user_table(main_uid);
            sqlx::query(&format!("DELETE FROM {user_table} WHERE main_uid = ?"))
                .bind(main_uid)
                .execute(&mut *tx)
                .await?;

            claim_transition(
                &mut *tx,
                &apply_table,
                ClaimKey::MainUid(main_uid),
                APPLY_SUCCESS,
                APPLY_DELETED,
                Some(now),
            )
            .await?;
            tx.commit().await?;
            info!(uid = main_uid, "deletion executed");

            // Revoke runs after commit; its failure never reopens the delete.
            if !self.revoke_third_party(&ext_info, config).await {
                error!(uid = main_uid, "third-party revoke failed after deletion");
            }
        }
        Ok(())
    }

    /// Restore every application flagged for recovery.
    pub(crate) async fn recover_pass(
        &self,
        pool: &SqlitePool,
        table_id: u32,
        now: i64,
    ) -> AtlasResult<()> {
        let apply_table = format!("user_delete_apply_{table_id}");
        let rows = sqlx::query(&format!(
            "SELECT main_uid, account FROM {apply_table} WHERE status = ?"
        ))
        .bind(APPLY_RECOVER)
        .fetch_all(pool)
        .await?;

        for row in rows {
            let main_uid: i64 = row.try_get("main_uid")?;
            let account: String = row.try_get("account")?;

            let mut tx = pool.begin().await?;
            let claimed = claim_transition(
                &mut *tx,
                &apply_table,
                ClaimKey::Account(&account),
                APPLY_RECOVER,
                APPLY_RECOVER_SUCCESS,
                None,
            )
            .await?;
            if claimed != 1 {
                tx.rollback().await?;
                continue;
            }

            // The live row normally still exists (undo happens inside the
            // cooldown) and only needs its status flipped back; a vanished
            // row is rebuilt from the snapshot.
            let user_table = route::game_user_table(main_uid);
            let flipped = sqlx::query(&format!(
                "UPDATE {user_table} SET status = ?, updated_time = ? \
                 WHERE account = ? AND status = ?"
            ))
            .bind(STATUS_NORMAL)
            .bind(now)
            .bind(&account)
            .bind(STATUS_DELETING)
            .execute(&mut *tx)
            .await?;
            if flipped.rows_affected() == 0 {
                let rebuilt = sqlx::query(&format!(
                    "INSERT INTO {user_table} \
                     (uid, main_uid, account, type, game_id, platform_id, status, created_time, updated_time) \
                     SELECT uid, main_uid, account, type, game_id, platform_id, ?, ?, ? \
                     FROM {apply_table} WHERE account = ?"
                ))
                .bind(STATUS_NORMAL)
                .bind(now)
                .bind(now)
                .bind(&account)
                .execute(&mut *tx)
                .await?;
                if rebuilt.rows_affected() != 1 {
                    warn!(uid = main_uid, account, "recover restored no row, leaving claim");
                    tx.rollback().await?;
                    continue;
                }
            }

            let dropped = sqlx::query(&format!("DELETE FROM {apply_table} WHERE account = ?"))
                .bind(&account)
                .execute(&mut *tx)
                .await?;
            if dropped.rows_affected() != 1 {
                tx.rollback().await?;
                continue;
            }
            tx.commit().await?;
            info!(uid = main_uid, account, "account recovered");
        }
        Ok(())
    }

    /// Swap a provider authorization code for a long-lived revoke token.
    /// Best-effort: any failure logs and returns an empty ext.
    async fn exchange_revoke_token(&self, raw: &str, config: &GameConfig) -> ApplyExt {
        let info: ThirdInfo = match serde_json::from_str(raw) {
            Ok(i) => i,
            Err(err) => {
                warn!("unparseable third info on deletion request: {err}");
                return ApplyExt::default();
            }
        };
        let third = match &config.third_party {
            Some(t) if info.third_id == types::THIRD_ID_APPLE && !info.authorization_code.is_empty() => t,
            _ => return ApplyExt::default(),
        };

        use base64::Engine;
        let code = match base64::engine::general_purpose::STANDARD.decode(&info.authorization_code)
        {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(_) => {
                    warn!("authorization code is not utf-8");
                    return ApplyExt::default();
                }
            },
            Err(err) => {
                warn!("authorization code base64 decode failed: {err}");
                return ApplyExt::default();
            }
        };

        let params = [
            ("client_id", third.client_id.as_str()),
            ("client_secret", third.client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
        ];
        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            refresh_token: String,
        }
        let response = self
            .http
            .post(&third.token_url)
            .form(&params)
            .send()
            .await;
        match response {
            Ok(resp) => match resp.json::<TokenResponse>().await {
                Ok(body) if !body.refresh_token.is_empty() => ApplyExt {
                    revoke_token: body.refresh_token,
                },
                Ok(_) => {
                    warn!("token exchange returned no refresh token");
                    ApplyExt::default()
                }
                Err(err) => {
                    warn!("token exchange response unreadable: {err}");
                    ApplyExt::default()
                }
            },
            Err(err) => {
                warn!("token exchange request failed: {err}");
                ApplyExt::default()
            }
        }
    }

    /// Revoke the provider session after a hard delete. An empty response
    /// body means success. Rows without a revoke token succeed trivially.
    async fn revoke_third_party(&self, ext_info: &str, config: &GameConfig) -> bool {
        let ext: ApplyExt = match serde_json::from_str(ext_info) {
            Ok(e) => e,
            Err(_) => return true,
        };
        if ext.revoke_token.is_empty() {
            return true;
        }
        let third = match &config.third_party {
            Some(t) => t,
            None => {
                error!("revoke token present but tenant has no provider credentials");
                return false;
            }
        };
        let params = [
            ("client_id", third.client_id.as_str()),
            ("client_secret", third.client_secret.as_str()),
            ("token_type_hint", "refresh_token"),
            ("token", ext.revoke_token.as_str()),
        ];
        match self.http.post(&third.revoke_url).form(&params).send().await {
            Ok(resp) => match resp.text().await {
                Ok(body) if body.is_empty() => true,
                Ok(body) => {
                    error!("revoke rejected: {body}");
                    false
                }
                Err(err) => {
                    error!("revoke response unreadable: {err}");
                    false
                }
            },
            Err(err) => {
                error!("revoke request failed: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::saga::SagaCoordinator;
    use crate::cache::memory::MemoryStore;
    use crate::config::TenantConfig;
    use crate::shard::registry::testing::memory_registry;
    use crate::token::TokenIssuer;
    use crate::uid::UidAllocator;

    const GAME: i64 = 1001;
    const PLATFORM: i64 = 1;

    fn main_of(tenant_uid: i64) -> i64 {
        uid::split_tenant_uid(tenant_uid).2
    }

    struct Fixture {
        saga: SagaCoordinator,
        manager: DeletionManager,
        store: Arc<AccountStore>,
        shards: Arc<ShardRegistry>,
    }

    async fn fixture(cooldown_days: i64) -> Fixture {
        let shards = Arc::new(memory_registry(GAME, PLATFORM).await);
        let cache: Arc<dyn crate::cache::CounterStore> = Arc::new(MemoryStore::new());
        let store = Arc::new(AccountStore::new(shards.clone(), cache.clone()));
        let tenants = Arc::new(TenantRegistry::default());
        tenants.refresh_games(&[TenantConfig {
            game_id: GAME,
            platform_id: PLATFORM,
            delete_cooldown_days: cooldown_days,
            third_party: None,
        }]);
        let saga = SagaCoordinator::new(
            shards.clone(),
            store.clone(),
            Arc::new(UidAllocator::new(cache)),
            Arc::new(TokenIssuer::new(
                "0123456789abcdef0123456789abcdef".to_string(),
                3600,
                86400,
            )),
        );
        let manager = DeletionManager::new(shards.clone(), store.clone(), tenants);
        Fixture { saga, manager, store, shards }
    }

    async fn run_passes(fx: &Fixture, now: i64) {
        let config = GameConfig {
            game_id: GAME,
            platform_id: PLATFORM,
            delete_cooldown_days: 0,
            third_party: None,
            rotated_at: 0,
        };
        for db_id in 1..=route::GAME_USER_DB_COUNT {
            let pool = fx
                .shards
                .game_user_pool_by_index(GAME, PLATFORM, db_id)
                .unwrap()
                .clone();
            for table_id in 1..=route::DELETE_APPLY_TABLE_COUNT {
                fx.manager.delete_pass(&pool, table_id, &config, now).await.unwrap();
                fx.manager.recover_pass(&pool, table_id, now).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn apply_snapshots_and_marks_users() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("to_delete", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();

        let execute_at = fx
            .manager
            .apply(out.uid, "to_delete", GAME, PLATFORM, None)
            .await
            .unwrap();
        assert!(execute_at > chrono::Utc::now().timestamp());

        let users = fx.store.get_game_users(main_of(out.uid), GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, STATUS_DELETING);

        // A second application while one is open is rejected.
        let err = fx
            .manager
            .apply(out.uid, "to_delete", GAME, PLATFORM, None)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::DELETE_APPLY_ALREADY_EXISTS);
    }

    #[tokio::test]
    async fn apply_rejects_mismatched_uid() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("mismatched", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let err = fx
            .manager
            .apply(out.uid + 1, "mismatched", GAME, PLATFORM, None)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::DELETE_ACCOUNT_AND_UID_NOT_MATCH);
    }

    #[tokio::test]
    async fn delete_pass_removes_users_after_cooldown() {
        let fx = fixture(0).await;
        let out = fx
            .saga
            .register("doomed", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        fx.manager
            .apply(out.uid, "doomed", GAME, PLATFORM, None)
            .await
            .unwrap();

        // Pretend the cooldown elapsed.
        let later = chrono::Utc::now().timestamp() + 10;
        run_passes(&fx, later).await;

        assert!(fx.store.get_game_users(main_of(out.uid), GAME, PLATFORM).await.unwrap().is_empty());
        // A second sweep finds nothing to claim.
        run_passes(&fx, later + 10).await;
    }

    #[tokio::test]
    async fn undo_then_recover_restores_users() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("second_thoughts", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        fx.manager
            .apply(out.uid, "second_thoughts", GAME, PLATFORM, None)
            .await
            .unwrap();
        fx.manager
            .undo(out.uid, "second_thoughts", GAME, PLATFORM)
            .await
            .unwrap();

        let now = chrono::Utc::now().timestamp();
        run_passes(&fx, now).await;

        let users = fx.store.get_game_users(main_of(out.uid), GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, STATUS_NORMAL);
        assert_eq!(users[0].account, "second_thoughts");

        // The apply row is consumed; a fresh application works again.
        fx.manager
            .apply(out.uid, "second_thoughts", GAME, PLATFORM, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn undo_without_pending_application_fails() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("never_applied", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let err = fx
            .manager
            .undo(out.uid, "never_applied", GAME, PLATFORM)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::UNDO_DELETE_APPLY_NOT_EXISTS);
    }

    #[tokio::test]
    async fn login_is_rejected_while_deletion_is_pending() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("walking_dead", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        fx.manager
            .apply(out.uid, "walking_dead", GAME, PLATFORM, None)
            .await
            .unwrap();

        let err = fx
            .saga
            .login(
                "walking_dead",
                crate::account::saga::Credential::Password("pw"),
                GAME,
                PLATFORM,
                0,
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::ACCOUNT_IS_BEING_DELETED);

        // Undo and recover, then the login works again.
        fx.manager
            .undo(out.uid, "walking_dead", GAME, PLATFORM)
            .await
            .unwrap();
        run_passes(&fx, chrono::Utc::now().timestamp()).await;
        fx.saga
            .login(
                "walking_dead",
                crate::account::saga::Credential::Password("pw"),
                GAME,
                PLATFORM,
                0,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pending_application_survives_early_sweep() {
        let fx = fixture(7).await;
        let out = fx
            .saga
            .register("still_cooling", types::ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        fx.manager
            .apply(out.uid, "still_cooling", GAME, PLATFORM, None)
            .await
            .unwrap();

        // Sweep before the cooldown elapses: nothing happens.
        run_passes(&fx, chrono::Utc::now().timestamp()).await;
        let users = fx.store.get_game_users(main_of(out.uid), GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].status, STATUS_DELETING);
    }
}
