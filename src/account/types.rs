/// Domain records and wire-shared constants.
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Identity types. A main account has at most one email, mobile, username
/// and guest identity; third-party identities are tracked per tenant.
pub const ACCOUNT_EMAIL: i32 = 1;
pub const ACCOUNT_MOBILE: i32 = 2;
pub const ACCOUNT_USERNAME: i32 = 3;
pub const ACCOUNT_GUEST: i32 = 4;
pub const ACCOUNT_THIRD: i32 = 5;

/// Column occupied by each identity type on the account row.
pub fn slot_column(account_type: i32) -> Option<&'static str> {
    match account_type {
        ACCOUNT_EMAIL => Some("email"),
        ACCOUNT_MOBILE => Some("mobile"),
        ACCOUNT_USERNAME => Some("user_name"),
        ACCOUNT_GUEST => Some("guest"),
        ACCOUNT_THIRD => Some("third"),
        _ => None,
    }
}

/// Placeholder for an empty identity slot; shared with other deployed
/// implementations.
pub const NO_VALUE: &str = "-1";

/// Third-party provider ids accepted in composite third-party identities
/// (`{provider}_{subject}`).
pub const THIRD_ID_MIN: i64 = 1001;
pub const THIRD_ID_MAX: i64 = 1016;
pub const THIRD_ID_APPLE: i64 = 1006;

/// Game-user lifecycle status.
pub const STATUS_NORMAL: i32 = 1;
pub const STATUS_DISABLED: i32 = 2;
pub const STATUS_DELETING: i32 = 3;

/// Deletion application status.
pub const APPLY_PENDING: i32 = 1;
pub const APPLY_SUCCESS: i32 = 2;
pub const APPLY_DELETED: i32 = 3;
pub const APPLY_RECOVER: i32 = 4;
pub const APPLY_RECOVER_SUCCESS: i32 = 5;

/// Verification-code purposes.
pub const CODE_REGISTER: i32 = 1;
pub const CODE_LOGIN: i32 = 2;
pub const CODE_FORGET_PASSWORD: i32 = 3;
pub const CODE_BIND: i32 = 4;
pub const CODE_DELETE: i32 = 5;

/// One row of an `account_N` table.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub uid: i64,
    pub email: String,
    pub mobile: String,
    pub user_name: String,
    pub guest: String,
    pub third: String,
    pub password: String,
    pub salt: String,
    /// Identity type used at registration; permanently bound.
    pub register_type: i32,
    pub name: String,
    pub card_id: String,
    pub status: i32,
    pub created_time: i64,
    pub updated_time: i64,
}

impl AccountRecord {
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            uid: row.try_get("uid")?,
            email: row.try_get("email")?,
            mobile: row.try_get("mobile")?,
            user_name: row.try_get("user_name")?,
            guest: row.try_get("guest")?,
            third: row.try_get("third")?,
            password: row.try_get("password")?,
            salt: row.try_get("salt")?,
            register_type: row.try_get("type")?,
            name: row.try_get("name")?,
            card_id: row.try_get("card_id")?,
            status: row.try_get("status")?,
            created_time: row.try_get("created_time")?,
            updated_time: row.try_get("updated_time")?,
        })
    }

    pub fn is_real_name_verified(&self) -> bool {
        !self.name.is_empty() && !self.card_id.is_empty()
    }

    /// Identity slot value for a type, None when the slot is empty.
    pub fn slot(&self, account_type: i32) -> Option<&str> {
        let value = match account_type {
            ACCOUNT_EMAIL => &self.email,
            ACCOUNT_MOBILE => &self.mobile,
            ACCOUNT_USERNAME => &self.user_name,
            ACCOUNT_GUEST => &self.guest,
            ACCOUNT_THIRD => &self.third,
            _ => return None,
        };
        if value == NO_VALUE || value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// One row of a `user_N` table.
#[derive(Debug, Clone, PartialEq)]
pub struct GameUserRecord {
    pub uid: i64,
    pub main_uid: i64,
    pub account: String,
    pub account_type: i32,
    pub game_id: i64,
    pub platform_id: i64,
    pub status: i32,
}

impl GameUserRecord {
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            uid: row.try_get("uid")?,
            main_uid: row.try_get("main_uid")?,
            account: row.try_get("account")?,
            account_type: row.try_get("type")?,
            game_id: row.try_get("game_id")?,
            platform_id: row.try_get("platform_id")?,
            status: row.try_get("status")?,
        })
    }
}

/// One row of a `user_delete_apply_N` table.
#[derive(Debug, Clone)]
pub struct DeleteApplication {
    pub uid: i64,
    pub main_uid: i64,
    pub account: String,
    pub account_type: i32,
    pub game_id: i64,
    pub platform_id: i64,
    pub status: i32,
    pub apply_time: i64,
    pub execute_delete_time: i64,
    pub ext_info: String,
}

impl DeleteApplication {
    pub fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            uid: row.try_get("uid")?,
            main_uid: row.try_get("main_uid")?,
            account: row.try_get("account")?,
            account_type: row.try_get("type")?,
            game_id: row.try_get("game_id")?,
            platform_id: row.try_get("platform_id")?,
            status: row.try_get("status")?,
            apply_time: row.try_get("apply_time")?,
            execute_delete_time: row.try_get("execute_delete_time")?,
            ext_info: row.try_get("ext_info")?,
        })
    }
}

/// Bound identities summary returned by auth flows and bind-info.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BindInfo {
    pub email: String,
    pub mobile: String,
    pub user_name: String,
    pub thirds: Vec<String>,
}

/// Minor-protection summary attached to auth responses.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct MinorGate {
    pub adult: i32,
    pub play_time: i64,
}

/// Parse a composite third-party identity `{provider}_{subject}`.
/// Provider range is checked separately so the caller can distinguish
/// a malformed identity from an unsupported provider.
pub fn parse_third_identity(account: &str) -> Option<(i64, &str)> {
    let (provider, subject) = account.split_once('_')?;
    let provider: i64 = provider.parse().ok()?;
    if subject.is_empty() {
        return None;
    }
    Some((provider, subject))
}

pub fn is_supported_third_id(provider: i64) -> bool {
    (THIRD_ID_MIN..=THIRD_ID_MAX).contains(&provider)
}
