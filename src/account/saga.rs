/// Multi-shard write flows: register, login, bind and unbind.
///
/// The hash index, account row and game-user row live in different SQLite
/// databases, so a single transaction cannot cover a registration. Instead
/// each flow opens one transaction per database, executes every statement
/// first, then commits in a fixed order with the hash index first. The hash
/// row is the source of truth: once it commits, the identity exists. An
/// account-commit failure after that point is repaired by a compensating
/// hash delete; a lost game-user commit is tolerated and healed on the next
/// login.
use std::sync::Arc;

use sqlx::{Sqlite, Transaction};
use tracing::{info, warn};

use crate::account::store::{self, AccountStore};
use crate::account::types::{
    self, AccountRecord, ACCOUNT_EMAIL, ACCOUNT_MOBILE, ACCOUNT_THIRD, NO_VALUE,
    STATUS_DELETING, STATUS_DISABLED, STATUS_NORMAL,
};
use crate::codes;
use crate::error::{AtlasError, AtlasResult};
use crate::shard::{route, ShardRegistry};
use crate::token::{TokenIssuer, TokenPair};
use crate::uid::{self, UidAllocator};

/// What happened to one shard's transaction by the end of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Committed,
    RolledBack,
    /// Committed, then undone by a compensating write.
    Compensated,
}

/// Per-shard outcome record attached to successful flows.
#[derive(Debug, Default, Clone)]
pub struct SagaReport {
    pub hash: Option<StepOutcome>,
    pub account: Option<StepOutcome>,
    pub game_user: Option<StepOutcome>,
}

/// Successful register/login result.
#[derive(Debug)]
pub struct AuthSuccess {
    pub uid: i64,
    pub tokens: TokenPair,
    pub code: i32,
    pub report: SagaReport,
}

/// How the caller proved ownership of the identity.
pub enum Credential<'a> {
    Password(&'a str),
    /// A verification code or third-party assertion already checked upstream.
    Verified,
}

#[cfg(test)]
#[derive(Default)]
pub(crate) struct FaultHooks {
    pub fail_hash_commit: std::sync::atomic::AtomicBool,
    pub fail_account_commit: std::sync::atomic::AtomicBool,
    pub fail_game_user_commit: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FaultHooks {
    fn take(flag: &std::sync::atomic::AtomicBool) -> bool {
        flag.swap(false, std::sync::atomic::Ordering::SeqCst)
    }
}

pub struct SagaCoordinator {
    shards: Arc<ShardRegistry>,
    store: Arc<AccountStore>,
    uid: Arc<UidAllocator>,
    tokens: Arc<TokenIssuer>,
    #[cfg(test)]
    pub(crate) faults: FaultHooks,
}

impl SagaCoordinator {
    pub fn new(
        shards: Arc<ShardRegistry>,
        store: Arc<AccountStore>,
        uid: Arc<UidAllocator>,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            shards,
            store,
            uid,
            tokens,
            #[cfg(test)]
            faults: FaultHooks::default(),
        }
    }

    /// Register a new identity, or fall through to login when it is already
    /// taken. Identity format and abuse limits are checked by the caller.
    pub async fn register(
        &self,
        account: &str,
        account_type: i32,
        password: Option<&str>,
        game_id: i64,
        platform_id: i64,
        channel_id: i64,
    ) -> AtlasResult<AuthSuccess> {
        if account_type == ACCOUNT_THIRD {
            let (provider, _) = types::parse_third_identity(account).ok_or_else(|| {
                AtlasError::op(
                    codes::THIRD_ID_PARSE_FAILURE,
                    format!("malformed third-party identity for game {game_id}"),
                )
            })?;
            if !types::is_supported_third_id(provider) {
                return Err(AtlasError::op(
                    codes::THIRD_ID_UNSUPPORTED,
                    format!("third-party provider {provider}"),
                ));
            }
        }
        // Same identity registered twice is a login, not an error.
        if self.store.get_uid_by_account(account).await?.is_some() {
            let credential = match password {
                Some(p) => Credential::Password(p),
                None => Credential::Verified,
            };
            return self
                .login(account, credential, game_id, platform_id, channel_id)
                .await;
        }

        let slot = types::slot_column(account_type).ok_or_else(|| {
            AtlasError::op(codes::REQUEST_DATA_INCORRECT, format!("account type {account_type}"))
        })?;
        // The hash index and account row carry the raw account uid; only the
        // game-user row (and everything client-facing) sees the composite.
        let main_uid = self.uid.allocate().await?;
        let tenant_uid = uid::compose_tenant_uid(main_uid, game_id, platform_id)?;

        let (hashed, salt) = match password {
            Some(p) => {
                let salt = store::gen_salt();
                (store::hash_password(p, &salt), salt)
            }
            None => (String::new(), String::new()),
        };
        let now = chrono::Utc::now().timestamp();

        let mut hash_tx = self.begin_hash_tx(account, codes::GET_HASH_DB_TX_ERROR).await?;
        let mut account_tx = self
            .begin_account_tx(main_uid, codes::GET_ACCOUNT_DB_TX_ERROR)
            .await?;
        let mut game_tx = self
            .begin_game_user_tx(main_uid, game_id, platform_id, codes::GET_GAME_USER_DB_TX_ERROR)
            .await?;

        // All statements execute before anything commits; an execution error
        // rolls every shard back.
        let hash_table = route::hash_table(account);
        let exec = sqlx::query(&format!(
            "INSERT INTO {hash_table} (account, uid) VALUES (?, ?)"
        ))
        .bind(account)
        .bind(main_uid)
        .execute(&mut *hash_tx)
        .await;
        if let Err(err) = exec {
            rollback_all(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::TX_EXEC_INSERT_HASH_ERROR,
                format!("hash insert failed: {err}"),
            ));
        }

        let account_table = route::account_table(main_uid);
        let exec = sqlx::query(&format!(
            "INSERT INTO {account_table} \
             (uid, {slot}, password, salt, type, status, created_time, updated_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(main_uid)
        .bind(account)
        .bind(&hashed)
        .bind(&salt)
        .bind(account_type)
        .bind(STATUS_NORMAL)
        .bind(now)
        .bind(now)
        .execute(&mut *account_tx)
        .await;
        if let Err(err) = exec {
            rollback_all(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::TX_EXEC_INSERT_ACCOUNT_ERROR,
                format!("account insert failed: {err}"),
            ));
        }

        let game_table = route::game_user_table(main_uid);
        let exec = sqlx::query(&format!(
            "INSERT INTO {game_table} \
             (uid, main_uid, account, type, game_id, platform_id, status, created_time, updated_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(tenant_uid)
        .bind(main_uid)
        .bind(account)
        .bind(account_type)
        .bind(game_id)
        .bind(platform_id)
        .bind(STATUS_NORMAL)
        .bind(now)
        .bind(now)
        .execute(&mut *game_tx)
        .await;
        if let Err(err) = exec {
            rollback_all(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::TX_EXEC_INSERT_GAME_USER_ERROR,
                format!("game user insert failed: {err}"),
            ));
        }

        // Tokens are built while every shard can still roll back, so a
        // signing failure never leaves a half-registered identity.
        let tokens = match self.tokens.issue_pair(tenant_uid, game_id, platform_id, channel_id) {
            Ok(pair) => pair,
            Err(err) => {
                rollback_all(hash_tx, account_tx, game_tx).await;
                return Err(err);
            }
        };

        let mut report = SagaReport::default();

        if let Err(err) = self.commit_hash(hash_tx).await {
            let _ = account_tx.rollback().await;
            let _ = game_tx.rollback().await;
            return Err(AtlasError::op(
                codes::TX_HASH_DB_COMMIT_ERROR,
                format!("hash commit failed, uid {main_uid}: {err}"),
            ));
        }
        report.hash = Some(StepOutcome::Committed);

        if let Err(err) = self.commit_account(account_tx).await {
            let _ = game_tx.rollback().await;
            self.compensate_hash_insert(account).await;
            return Err(AtlasError::op(
                codes::TX_ACCOUNT_DB_COMMIT_ERROR,
                format!("account commit failed, uid {main_uid}, hash row compensated: {err}"),
            ));
        }
        report.account = Some(StepOutcome::Committed);

        match self.commit_game_user(game_tx).await {
            Ok(()) => report.game_user = Some(StepOutcome::Committed),
            Err(err) => {
                // Identity and account row are durable; the game-user row is
                // re-created by the next login.
                warn!(uid = main_uid, "game user commit lost, healed on login: {err}");
                report.game_user = Some(StepOutcome::RolledBack);
            }
        }

        info!(uid = tenant_uid, main_uid, game_id, platform_id, account_type, "account registered");
        Ok(AuthSuccess {
            uid: tenant_uid,
            tokens,
            code: codes::REGISTER_SUCCESS,
            report,
        })
    }

    /// Authenticate an existing identity and heal a missing game-user row.
    pub async fn login(
        &self,
        account: &str,
        credential: Credential<'_>,
        game_id: i64,
        platform_id: i64,
        channel_id: i64,
    ) -> AtlasResult<AuthSuccess> {
        let record = self
            .store
            .get_account_by_identity(account)
            .await?
            .ok_or_else(|| {
                // Same code as a wrong password so callers cannot enumerate
                // registered identities.
                AtlasError::op(
                    codes::LOGIN_USER_OR_PASSWORD_ERROR,
                    "login for unknown identity".to_string(),
                )
            })?;

        if let Credential::Password(password) = credential {
            if !store::verify_password(&record, password) {
                return Err(AtlasError::op(
                    codes::LOGIN_USER_OR_PASSWORD_ERROR,
                    format!("password mismatch, uid {}", record.uid),
                ));
            }
        }

        match record.status {
            STATUS_DISABLED => {
                return Err(AtlasError::op(
                    codes::LOGIN_ACCOUNT_DISABLED,
                    format!("disabled account {}", record.uid),
                ))
            }
            STATUS_DELETING => {
                return Err(AtlasError::op(
                    codes::ACCOUNT_IS_BEING_DELETED,
                    format!("deleting account {}", record.uid),
                ))
            }
            _ => {}
        }

        let mut report = SagaReport::default();
        let existing = self
            .store
            .get_game_user(record.uid, account, game_id, platform_id)
            .await?;
        let tenant_uid = match existing {
            Some(user) if user.status == STATUS_DELETING => {
                return Err(AtlasError::op(
                    codes::ACCOUNT_IS_BEING_DELETED,
                    format!("deleting game user {}", record.uid),
                ))
            }
            Some(user) => user.uid,
            None => {
                // Registration's final commit was lost, or this identity has
                // never entered this tenant. Either way the row is recreated,
                // with a composite uid carrying this tenant's prefix.
                let tenant_uid = uid::compose_tenant_uid(record.uid, game_id, platform_id)?;
                let account_type = identity_type_on(&record, account);
                self.store
                    .insert_game_user(
                        tenant_uid,
                        record.uid,
                        account,
                        account_type,
                        game_id,
                        platform_id,
                    )
                    .await
                    .map_err(|err| {
                        AtlasError::op(
                            codes::LOGIN_INSERT_GAME_USER_ERROR,
                            format!("game user heal failed, uid {}: {err}", record.uid),
                        )
                    })?;
                report.game_user = Some(StepOutcome::Committed);
                info!(uid = record.uid, game_id, "game user row healed at login");
                tenant_uid
            }
        };

        let tokens = self
            .tokens
            .issue_pair(tenant_uid, game_id, platform_id, channel_id)?;
        Ok(AuthSuccess {
            uid: tenant_uid,
            tokens,
            code: codes::LOGIN_SUCCESS,
            report,
        })
    }

    /// Bind an additional identity to an existing account. `uid` is the
    /// caller's composite tenant uid; email/mobile binds may set a password
    /// at the same time.
    pub async fn bind(
        &self,
        uid: i64,
        account: &str,
        account_type: i32,
        password: Option<&str>,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<SagaReport> {
        let main_uid = uid::main_uid_for_tenant(uid, game_id, platform_id)?;
        let record = self.store.get_account(main_uid).await?.ok_or_else(|| {
            AtlasError::op(
                codes::BIND_ACCOUNT_NOT_EXISTS,
                format!("bind onto missing account {main_uid}"),
            )
        })?;
        if record.slot(account_type).is_some() {
            let code = match account_type {
                ACCOUNT_EMAIL => codes::BIND_EMAIL_ALREADY_EXISTS,
                ACCOUNT_MOBILE => codes::BIND_MOBILE_ALREADY_EXISTS,
                _ => codes::BIND_ACCOUNT_ALREADY_EXISTS,
            };
            return Err(AtlasError::op(
                code,
                format!("slot {account_type} occupied on {main_uid}"),
            ));
        }
        if self.store.get_uid_by_account(account).await?.is_some() {
            return Err(AtlasError::op(
                codes::BIND_ACCOUNT_ALREADY_EXISTS,
                format!("identity already registered, bind onto {main_uid}"),
            ));
        }
        let slot = types::slot_column(account_type).ok_or_else(|| {
            AtlasError::op(codes::REQUEST_DATA_INCORRECT, format!("account type {account_type}"))
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut hash_tx = self.begin_hash_tx(account, codes::BIND_GET_HASH_TX_ERROR).await?;
        let mut account_tx = self
            .begin_account_tx(main_uid, codes::BIND_GET_ACCOUNT_DB_TX_ERROR)
            .await?;
        // Third-party identities also get their own game-user row; the other
        // types reuse the main row.
        let mut game_tx = if account_type == ACCOUNT_THIRD {
            Some(
                self.begin_game_user_tx(
                    main_uid,
                    game_id,
                    platform_id,
                    codes::BIND_GET_GAME_USER_DB_TX_ERROR,
                )
                .await?,
            )
        } else {
            None
        };

        let hash_table = route::hash_table(account);
        let exec = sqlx::query(&format!(
            "INSERT INTO {hash_table} (account, uid) VALUES (?, ?)"
        ))
        .bind(account)
        .bind(main_uid)
        .execute(&mut *hash_tx)
        .await;
        if let Err(err) = exec {
            rollback_bind(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::BIND_HASH_TX_EXEC_INSERT_ERROR,
                format!("bind hash insert failed: {err}"),
            ));
        }

        let account_table = route::account_table(main_uid);
        let exec = match password {
            Some(p) => {
                let new_salt = store::gen_salt();
                let new_hash = store::hash_password(p, &new_salt);
                sqlx::query(&format!(
                    "UPDATE {account_table} \
                     SET {slot} = ?, password = ?, salt = ?, updated_time = ? WHERE uid = ?"
                ))
                .bind(account)
                .bind(new_hash)
                .bind(new_salt)
                .bind(now)
                .bind(main_uid)
                .execute(&mut *account_tx)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "UPDATE {account_table} SET {slot} = ?, updated_time = ? WHERE uid = ?"
                ))
                .bind(account)
                .bind(now)
                .bind(main_uid)
                .execute(&mut *account_tx)
                .await
            }
        };
        match exec {
            Ok(result) if result.rows_affected() == 1 => {}
            Ok(_) => {
                rollback_bind(hash_tx, account_tx, game_tx).await;
                return Err(AtlasError::op(
                    codes::BIND_ACCOUNT_TX_EXEC_UPDATE_ERROR,
                    format!("bind account update touched no row, uid {main_uid}"),
                ));
            }
            Err(err) => {
                rollback_bind(hash_tx, account_tx, game_tx).await;
                return Err(AtlasError::op(
                    codes::BIND_ACCOUNT_TX_EXEC_UPDATE_ERROR,
                    format!("bind account update failed: {err}"),
                ));
            }
        }

        if let Some(tx) = game_tx.as_mut() {
            let game_table = route::game_user_table(main_uid);
            let exec = sqlx::query(&format!(
                "INSERT INTO {game_table} \
                 (uid, main_uid, account, type, game_id, platform_id, status, created_time, updated_time) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(uid)
            .bind(main_uid)
            .bind(account)
            .bind(account_type)
            .bind(game_id)
            .bind(platform_id)
            .bind(STATUS_NORMAL)
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await;
            if let Err(err) = exec {
                rollback_bind(hash_tx, account_tx, game_tx).await;
                return Err(AtlasError::op(
                    codes::BIND_GAME_TX_EXEC_INSERT_ERROR,
                    format!("bind game user insert failed: {err}"),
                ));
            }
        }

        let mut report = SagaReport::default();
        if let Err(err) = self.commit_hash(hash_tx).await {
            let _ = account_tx.rollback().await;
            if let Some(tx) = game_tx {
                let _ = tx.rollback().await;
            }
            return Err(AtlasError::op(
                codes::TX_HASH_DB_COMMIT_ERROR,
                format!("bind hash commit failed, uid {main_uid}: {err}"),
            ));
        }
        report.hash = Some(StepOutcome::Committed);

        if let Err(err) = self.commit_account(account_tx).await {
            if let Some(tx) = game_tx {
                let _ = tx.rollback().await;
            }
            self.compensate_hash_insert(account).await;
            return Err(AtlasError::op(
                codes::TX_ACCOUNT_DB_COMMIT_ERROR,
                format!("bind account commit failed, uid {main_uid}, hash row compensated: {err}"),
            ));
        }
        report.account = Some(StepOutcome::Committed);

        if let Some(tx) = game_tx {
            match self.commit_game_user(tx).await {
                Ok(()) => report.game_user = Some(StepOutcome::Committed),
                Err(err) => {
                    warn!(uid = main_uid, "bind game user commit lost, healed on login: {err}");
                    report.game_user = Some(StepOutcome::RolledBack);
                }
            }
        }

        info!(uid = main_uid, account_type, "identity bound");
        Ok(report)
    }

    /// Remove a bound identity. The identity used at registration can never
    /// be unbound.
    pub async fn unbind(
        &self,
        uid: i64,
        account: &str,
        account_type: i32,
        game_id: i64,
        platform_id: i64,
    ) -> AtlasResult<SagaReport> {
        let main_uid = uid::main_uid_for_tenant(uid, game_id, platform_id)?;
        let record = self.store.get_account(main_uid).await?.ok_or_else(|| {
            AtlasError::op(
                codes::UNBIND_ACCOUNT_NOT_EXISTS,
                format!("unbind from missing account {main_uid}"),
            )
        })?;
        if record.register_type == account_type {
            return Err(AtlasError::op(
                codes::UNBIND_UNSUPPORT_REGISTER_TYPE,
                format!("register type {account_type} on {main_uid}"),
            ));
        }
        match self.store.get_uid_by_account(account).await? {
            None => {
                return Err(AtlasError::op(
                    codes::BE_UNBIND_ACCOUNT_NOT_EXISTS,
                    format!("unbind target unknown, uid {main_uid}"),
                ))
            }
            Some(owner) if owner != main_uid => {
                return Err(AtlasError::op(
                    codes::UNBIND_ACCOUNT_NOT_MATCH,
                    format!("unbind target owned by {owner}, requested by {main_uid}"),
                ))
            }
            Some(_) => {}
        }
        if record.slot(account_type).is_none() {
            let code = match account_type {
                ACCOUNT_EMAIL => codes::EMAIL_ALREADY_UNBIND,
                ACCOUNT_MOBILE => codes::MOBILE_ALREADY_UNBIND,
                _ => codes::BE_UNBIND_ACCOUNT_NOT_EXISTS,
            };
            return Err(AtlasError::op(
                code,
                format!("slot {account_type} empty on {main_uid}"),
            ));
        }
        let slot = types::slot_column(account_type).ok_or_else(|| {
            AtlasError::op(codes::REQUEST_DATA_INCORRECT, format!("account type {account_type}"))
        })?;

        let now = chrono::Utc::now().timestamp();
        let mut game_tx = if account_type == ACCOUNT_THIRD {
            Some(
                self.begin_game_user_tx(
                    main_uid,
                    game_id,
                    platform_id,
                    codes::UNBIND_GET_GAME_USER_DB_TX_ERROR,
                )
                .await?,
            )
        } else {
            None
        };
        let mut hash_tx = self
            .begin_hash_tx(account, codes::UNBIND_GET_HASH_TX_ERROR)
            .await?;
        let mut account_tx = self
            .begin_account_tx(main_uid, codes::UNBIND_GET_ACCOUNT_DB_TX_ERROR)
            .await?;

        if let Some(tx) = game_tx.as_mut() {
            let game_table = route::game_user_table(main_uid);
            let exec = sqlx::query(&format!(
                "DELETE FROM {game_table} WHERE main_uid = ? AND account = ?"
            ))
            .bind(main_uid)
            .bind(account)
            .execute(&mut **tx)
            .await;
            if let Err(err) = exec {
                rollback_bind(hash_tx, account_tx, game_tx).await;
                return Err(AtlasError::op(
                    codes::UNBIND_GAME_USER_TX_EXEC_DELETE_ERROR,
                    format!("unbind game user delete failed: {err}"),
                ));
            }
        }

        let hash_table = route::hash_table(account);
        let exec = sqlx::query(&format!("DELETE FROM {hash_table} WHERE account = ?"))
            .bind(account)
            .execute(&mut *hash_tx)
            .await;
        if let Err(err) = exec {
            rollback_bind(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::UNBIND_HASH_TX_EXEC_ERROR,
                format!("unbind hash delete failed: {err}"),
            ));
        }

        let account_table = route::account_table(main_uid);
        let exec = sqlx::query(&format!(
            "UPDATE {account_table} SET {slot} = ?, updated_time = ? WHERE uid = ?"
        ))
        .bind(NO_VALUE)
        .bind(now)
        .bind(main_uid)
        .execute(&mut *account_tx)
        .await;
        if let Err(err) = exec {
            rollback_bind(hash_tx, account_tx, game_tx).await;
            return Err(AtlasError::op(
                codes::UNBIND_ACCOUNT_TX_EXEC_UPDATE_ERROR,
                format!("unbind account update failed: {err}"),
            ));
        }

        // Commit order mirrors register in reverse: the game-user row goes
        // first so a partial failure leaves the identity still resolvable.
        let mut report = SagaReport::default();
        if let Some(tx) = game_tx {
            match self.commit_game_user(tx).await {
                Ok(()) => report.game_user = Some(StepOutcome::Committed),
                Err(err) => {
                    warn!(uid = main_uid, "unbind game user commit lost: {err}");
                    report.game_user = Some(StepOutcome::RolledBack);
                }
            }
        }
        match self.commit_hash(hash_tx).await {
            Ok(()) => report.hash = Some(StepOutcome::Committed),
            Err(err) => {
                warn!(uid = main_uid, "unbind hash commit lost: {err}");
                report.hash = Some(StepOutcome::RolledBack);
            }
        }
        match self.commit_account(account_tx).await {
            Ok(()) => report.account = Some(StepOutcome::Committed),
            Err(err) => {
                warn!(uid = main_uid, "unbind account commit lost: {err}");
                report.account = Some(StepOutcome::RolledBack);
            }
        }

        info!(uid = main_uid, account_type, "identity unbound");
        Ok(report)
    }

    async fn begin_hash_tx(
        &self,
        account: &str,
        code: i32,
    ) -> AtlasResult<Transaction<'static, Sqlite>> {
        let pool = self.shards.hash_pool(account)?;
        pool.begin()
            .await
            .map_err(|err| AtlasError::op(code, format!("begin hash tx: {err}")))
    }

    async fn begin_account_tx(
        &self,
        uid: i64,
        code: i32,
    ) -> AtlasResult<Transaction<'static, Sqlite>> {
        let pool = self.shards.account_pool_for_uid(uid)?;
        pool.begin()
            .await
            .map_err(|err| AtlasError::op(code, format!("begin account tx: {err}")))
    }

    async fn begin_game_user_tx(
        &self,
        uid: i64,
        game_id: i64,
        platform_id: i64,
        code: i32,
    ) -> AtlasResult<Transaction<'static, Sqlite>> {
        let pool = self.shards.game_user_pool(uid, game_id, platform_id)?;
        pool.begin()
            .await
            .map_err(|err| AtlasError::op(code, format!("begin game user tx: {err}")))
    }

    async fn commit_hash(&self, tx: Transaction<'static, Sqlite>) -> Result<(), sqlx::Error> {
        #[cfg(test)]
        if FaultHooks::take(&self.faults.fail_hash_commit) {
            let _ = tx.rollback().await;
            return Err(sqlx::Error::PoolClosed);
        }
        tx.commit().await
    }

    async fn commit_account(&self, tx: Transaction<'static, Sqlite>) -> Result<(), sqlx::Error> {
        #[cfg(test)]
        if FaultHooks::take(&self.faults.fail_account_commit) {
            let _ = tx.rollback().await;
            return Err(sqlx::Error::PoolClosed);
        }
        tx.commit().await
    }

    async fn commit_game_user(&self, tx: Transaction<'static, Sqlite>) -> Result<(), sqlx::Error> {
        #[cfg(test)]
        if FaultHooks::take(&self.faults.fail_game_user_commit) {
            let _ = tx.rollback().await;
            return Err(sqlx::Error::PoolClosed);
        }
        tx.commit().await
    }

    /// Undo a committed hash insert after a later shard failed. Runs outside
    /// any transaction; a failure here leaves a dangling hash row, which is
    /// logged loudly for manual repair.
    async fn compensate_hash_insert(&self, account: &str) {
        let result = async {
            let pool = self.shards.hash_pool(account)?;
            let table = route::hash_table(account);
            sqlx::query(&format!("DELETE FROM {table} WHERE account = ?"))
                .bind(account)
                .execute(pool)
                .await?;
            Ok::<_, AtlasError>(())
        }
        .await;
        match result {
            Ok(()) => info!("compensating hash delete applied"),
            Err(err) => {
                tracing::error!("compensating hash delete FAILED, dangling index row: {err}")
            }
        }
    }
}

/// Identity type of `account` on this record, falling back to the register
/// type when no slot matches.
fn identity_type_on(record: &AccountRecord, account: &str) -> i32 {
    for account_type in [
        types::ACCOUNT_EMAIL,
        types::ACCOUNT_MOBILE,
        types::ACCOUNT_USERNAME,
        types::ACCOUNT_GUEST,
        types::ACCOUNT_THIRD,
    ] {
        if record.slot(account_type) == Some(account) {
            return account_type;
        }
    }
    record.register_type
}

async fn rollback_all(
    hash_tx: Transaction<'static, Sqlite>,
    account_tx: Transaction<'static, Sqlite>,
    game_tx: Transaction<'static, Sqlite>,
) {
    let _ = hash_tx.rollback().await;
    let _ = account_tx.rollback().await;
    let _ = game_tx.rollback().await;
}

async fn rollback_bind(
    hash_tx: Transaction<'static, Sqlite>,
    account_tx: Transaction<'static, Sqlite>,
    game_tx: Option<Transaction<'static, Sqlite>>,
) {
    let _ = hash_tx.rollback().await;
    let _ = account_tx.rollback().await;
    if let Some(tx) = game_tx {
        let _ = tx.rollback().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::{ACCOUNT_GUEST, ACCOUNT_USERNAME};
    use crate::cache::memory::MemoryStore;
    use crate::shard::registry::testing::memory_registry_for;
    use std::sync::atomic::Ordering;

    const GAME: i64 = 1001;
    const PLATFORM: i64 = 1;

    async fn coordinator() -> SagaCoordinator {
        coordinator_for(&[(GAME, PLATFORM)]).await
    }

    async fn coordinator_for(tenants: &[(i64, i64)]) -> SagaCoordinator {
        let shards = Arc::new(memory_registry_for(tenants).await);
        let cache: Arc<dyn crate::cache::CounterStore> = Arc::new(MemoryStore::new());
        let store = Arc::new(AccountStore::new(shards.clone(), cache.clone()));
        let uid = Arc::new(UidAllocator::new(cache));
        let tokens = Arc::new(TokenIssuer::new(
            "0123456789abcdef0123456789abcdef".to_string(),
            3600,
            86400,
        ));
        SagaCoordinator::new(shards, store, uid, tokens)
    }

    fn store_of(saga: &SagaCoordinator) -> Arc<AccountStore> {
        saga.store.clone()
    }

    #[tokio::test]
    async fn register_creates_all_three_rows() {
        let saga = coordinator().await;
        let out = saga
            .register("player_one", ACCOUNT_USERNAME, Some("hunter22"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(out.code, codes::REGISTER_SUCCESS);
        assert_eq!(out.report.hash, Some(StepOutcome::Committed));
        assert_eq!(out.report.account, Some(StepOutcome::Committed));
        assert_eq!(out.report.game_user, Some(StepOutcome::Committed));
        assert!(!out.tokens.token.is_empty());

        let store = store_of(&saga);
        let main_uid = store.get_uid_by_account("player_one").await.unwrap().unwrap();
        // The hash index and account row carry the raw uid; the returned uid
        // is the composite with this tenant's prefix.
        assert_eq!(uid::split_tenant_uid(out.uid), (GAME, PLATFORM, main_uid));
        let record = store.get_account(main_uid).await.unwrap().unwrap();
        assert_eq!(record.uid, main_uid);
        assert_eq!(record.user_name, "player_one");
        assert_eq!(record.register_type, ACCOUNT_USERNAME);
        let users = store.get_game_users(main_uid, GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].uid, out.uid);
        assert_eq!(users[0].main_uid, main_uid);
    }

    #[tokio::test]
    async fn re_register_falls_through_to_login() {
        let saga = coordinator().await;
        let first = saga
            .register("player_two", ACCOUNT_USERNAME, Some("hunter22"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let second = saga
            .register("player_two", ACCOUNT_USERNAME, Some("hunter22"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(second.code, codes::LOGIN_SUCCESS);
        assert_eq!(second.uid, first.uid);
    }

    #[tokio::test]
    async fn wrong_password_is_indistinguishable_from_unknown_account() {
        let saga = coordinator().await;
        saga.register("player_three", ACCOUNT_USERNAME, Some("right"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let wrong = saga
            .login("player_three", Credential::Password("wrong"), GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        let unknown = saga
            .login("never_seen", Credential::Password("x"), GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        assert_eq!(wrong.wire_code(), codes::LOGIN_USER_OR_PASSWORD_ERROR);
        assert_eq!(unknown.wire_code(), codes::LOGIN_USER_OR_PASSWORD_ERROR);
    }

    #[tokio::test]
    async fn hash_commit_failure_rolls_everything_back() {
        let saga = coordinator().await;
        saga.faults.fail_hash_commit.store(true, Ordering::SeqCst);
        let err = saga
            .register("ghost_account", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::TX_HASH_DB_COMMIT_ERROR);

        let store = store_of(&saga);
        assert!(store.get_uid_by_account("ghost_account").await.unwrap().is_none());
        // Nothing half-registered: a fresh register with the same name works.
        let out = saga
            .register("ghost_account", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(out.code, codes::REGISTER_SUCCESS);
    }

    #[tokio::test]
    async fn account_commit_failure_compensates_the_hash_row() {
        let saga = coordinator().await;
        saga.faults.fail_account_commit.store(true, Ordering::SeqCst);
        let err = saga
            .register("torn_account", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::TX_ACCOUNT_DB_COMMIT_ERROR);

        // The committed hash row was deleted by the compensating write.
        let store = store_of(&saga);
        assert!(store.get_uid_by_account("torn_account").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lost_game_user_commit_still_registers_and_heals_on_login() {
        let saga = coordinator().await;
        saga.faults.fail_game_user_commit.store(true, Ordering::SeqCst);
        let out = saga
            .register("limping_in", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(out.code, codes::REGISTER_SUCCESS);
        assert_eq!(out.report.game_user, Some(StepOutcome::RolledBack));

        let store = store_of(&saga);
        let main_uid = uid::split_tenant_uid(out.uid).2;
        assert!(store.get_game_users(main_uid, GAME, PLATFORM).await.unwrap().is_empty());

        let login = saga
            .login("limping_in", Credential::Password("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(login.code, codes::LOGIN_SUCCESS);
        assert_eq!(login.uid, out.uid);
        assert_eq!(login.report.game_user, Some(StepOutcome::Committed));
        assert_eq!(store.get_game_users(main_uid, GAME, PLATFORM).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn guest_register_without_password_logs_in_verified() {
        let saga = coordinator().await;
        let out = saga
            .register("guest-device-12345", ACCOUNT_GUEST, None, GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(out.code, codes::REGISTER_SUCCESS);
        let again = saga
            .register("guest-device-12345", ACCOUNT_GUEST, None, GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(again.code, codes::LOGIN_SUCCESS);
    }

    #[tokio::test]
    async fn bind_and_unbind_round_trip() {
        let saga = coordinator().await;
        let out = saga
            .register("binder", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();

        let report = saga
            .bind(out.uid, "binder@example.com", ACCOUNT_EMAIL, None, GAME, PLATFORM)
            .await
            .unwrap();
        assert_eq!(report.hash, Some(StepOutcome::Committed));
        assert_eq!(report.account, Some(StepOutcome::Committed));

        let store = store_of(&saga);
        let main_uid = uid::split_tenant_uid(out.uid).2;
        let record = store.get_account(main_uid).await.unwrap().unwrap();
        assert_eq!(record.email, "binder@example.com");
        assert_eq!(
            store.get_uid_by_account("binder@example.com").await.unwrap(),
            Some(main_uid)
        );
        // The bound email can log in with the account's password.
        let login = saga
            .login("binder@example.com", Credential::Password("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(login.uid, out.uid);

        saga.unbind(out.uid, "binder@example.com", ACCOUNT_EMAIL, GAME, PLATFORM)
            .await
            .unwrap();
        let record = store.get_account(main_uid).await.unwrap().unwrap();
        assert_eq!(record.email, NO_VALUE);
        assert!(store
            .get_uid_by_account("binder@example.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cannot_unbind_register_type() {
        let saga = coordinator().await;
        let out = saga
            .register("stuck", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let err = saga
            .unbind(out.uid, "stuck", ACCOUNT_USERNAME, GAME, PLATFORM)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::UNBIND_UNSUPPORT_REGISTER_TYPE);
    }

    #[tokio::test]
    async fn bind_taken_identity_is_rejected() {
        let saga = coordinator().await;
        let a = saga
            .register("owner_a", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        saga.bind(a.uid, "shared@example.com", ACCOUNT_EMAIL, None, GAME, PLATFORM)
            .await
            .unwrap();
        let b = saga
            .register("owner_b", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let err = saga
            .bind(b.uid, "shared@example.com", ACCOUNT_EMAIL, None, GAME, PLATFORM)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::BIND_ACCOUNT_ALREADY_EXISTS);
    }

    #[tokio::test]
    async fn bind_account_commit_failure_compensates() {
        let saga = coordinator().await;
        let out = saga
            .register("torn_bind", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        saga.faults.fail_account_commit.store(true, Ordering::SeqCst);
        let err = saga
            .bind(out.uid, "torn@example.com", ACCOUNT_EMAIL, None, GAME, PLATFORM)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::TX_ACCOUNT_DB_COMMIT_ERROR);

        let store = store_of(&saga);
        assert!(store.get_uid_by_account("torn@example.com").await.unwrap().is_none());
        let record = store
            .get_account(uid::split_tenant_uid(out.uid).2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.email, NO_VALUE);
        // Retry succeeds cleanly.
        saga.bind(out.uid, "torn@example.com", ACCOUNT_EMAIL, None, GAME, PLATFORM)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn third_party_bind_creates_game_user_row() {
        let saga = coordinator().await;
        let out = saga
            .register("has_thirds", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        saga.bind(out.uid, "1006_applesub99", ACCOUNT_THIRD, None, GAME, PLATFORM)
            .await
            .unwrap();
        let store = store_of(&saga);
        let main_uid = uid::split_tenant_uid(out.uid).2;
        let users = store.get_game_users(main_uid, GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 2);

        let info = store
            .bind_info(
                &store.get_account(main_uid).await.unwrap().unwrap(),
                GAME,
                PLATFORM,
            )
            .await
            .unwrap();
        assert_eq!(info.thirds, vec!["1006".to_string()]);

        saga.unbind(out.uid, "1006_applesub99", ACCOUNT_THIRD, GAME, PLATFORM)
            .await
            .unwrap();
        let users = store.get_game_users(main_uid, GAME, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn cross_tenant_login_gets_its_own_tenant_prefix() {
        let saga = coordinator_for(&[(GAME, PLATFORM), (1002, PLATFORM)]).await;
        let first = saga
            .register("roaming_player", ACCOUNT_USERNAME, Some("pw"), GAME, PLATFORM, 0)
            .await
            .unwrap();
        let main_uid = uid::split_tenant_uid(first.uid).2;
        assert_eq!(uid::split_tenant_uid(first.uid).0, GAME);

        // First login on another tenant heals a game-user row whose composite
        // uid carries that tenant's prefix, not the registering tenant's.
        let second = saga
            .login("roaming_player", Credential::Password("pw"), 1002, PLATFORM, 0)
            .await
            .unwrap();
        assert_eq!(uid::split_tenant_uid(second.uid), (1002, PLATFORM, main_uid));

        let store = store_of(&saga);
        let users = store.get_game_users(main_uid, 1002, PLATFORM).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].uid, second.uid);
        assert_eq!(users[0].main_uid, main_uid);
    }

    #[tokio::test]
    async fn bind_with_password_sets_credentials() {
        let saga = coordinator().await;
        let out = saga
            .register("guest-device-777777", ACCOUNT_GUEST, None, GAME, PLATFORM, 0)
            .await
            .unwrap();
        saga.bind(
            out.uid,
            "upgraded@example.com",
            ACCOUNT_EMAIL,
            Some("hunter22"),
            GAME,
            PLATFORM,
        )
        .await
        .unwrap();

        let login = saga
            .login(
                "upgraded@example.com",
                Credential::Password("hunter22"),
                GAME,
                PLATFORM,
                0,
            )
            .await
            .unwrap();
        assert_eq!(login.uid, out.uid);

        let err = saga
            .login(
                "upgraded@example.com",
                Credential::Password("wrong"),
                GAME,
                PLATFORM,
                0,
            )
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::LOGIN_USER_OR_PASSWORD_ERROR);
    }

    #[tokio::test]
    async fn malformed_third_identity_rejected_at_register() {
        let saga = coordinator().await;
        let err = saga
            .register("not-composite", ACCOUNT_THIRD, None, GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::THIRD_ID_PARSE_FAILURE);

        let err = saga
            .register("9999_bogus", ACCOUNT_THIRD, None, GAME, PLATFORM, 0)
            .await
            .unwrap_err();
        assert_eq!(err.wire_code(), codes::THIRD_ID_UNSUPPORTED);
    }
}
