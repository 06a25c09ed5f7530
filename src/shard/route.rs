/// Deterministic shard routing.
///
/// Every key is reduced with the same digest: crc32 (IEEE) over the
/// lowercase-hex md5 of the input, then modulo the partition count for the
/// space, +1 (partitions are 1-indexed). The digest is shared with other
/// deployed implementations and must never change.
use md5::{Digest, Md5};

/// Main account database count
pub const ACCOUNT_DB_COUNT: u32 = 3;
/// Main account table count per database
pub const ACCOUNT_TABLE_COUNT: u32 = 100;
/// Identity hash-index database count
pub const HASH_DB_COUNT: u32 = 3;
/// Identity hash-index table count per database
pub const HASH_TABLE_COUNT: u32 = 100;
/// Game-user database count per tenant
pub const GAME_USER_DB_COUNT: u32 = 2;
/// Game-user table count per database
pub const GAME_USER_TABLE_COUNT: u32 = 100;
/// Deletion-application table count per game-user database
pub const DELETE_APPLY_TABLE_COUNT: u32 = 5;

/// crc32 over hex(md5(s)); the shared routing digest.
pub fn digest32(s: &str) -> u32 {
    let md5_hex = hex::encode(Md5::digest(s.as_bytes()));
    crc32fast::hash(md5_hex.as_bytes())
}

/// Account database index (1-based) for an identity string or decimal UID.
pub fn account_db_id(key: &str) -> u32 {
    digest32(key) % ACCOUNT_DB_COUNT + 1
}

/// Account table name for a UID.
pub fn account_table(uid: i64) -> String {
    format!("account_{}", digest32(&uid.to_string()) % ACCOUNT_TABLE_COUNT + 1)
}

/// Hash-index database index (1-based) for an identity string.
pub fn hash_db_id(account: &str) -> u32 {
    digest32(account) % HASH_DB_COUNT + 1
}

/// Hash-index table name for an identity string.
pub fn hash_table(account: &str) -> String {
    format!("account_hash_{}", digest32(account) % HASH_TABLE_COUNT + 1)
}

/// Game-user database index (1-based) for a main UID, within a tenant.
pub fn game_user_db_id(uid: i64) -> u32 {
    digest32(&uid.to_string()) % GAME_USER_DB_COUNT + 1
}

/// Game-user table name for a main UID.
pub fn game_user_table(uid: i64) -> String {
    format!("user_{}", digest32(&uid.to_string()) % GAME_USER_TABLE_COUNT + 1)
}

/// Deletion-application table name for a main UID.
pub fn delete_apply_table(uid: i64) -> String {
    format!(
        "user_delete_apply_{}",
        digest32(&uid.to_string()) % DELETE_APPLY_TABLE_COUNT + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let inputs = ["user@example.com", "13800138000", "guest_5f2a", "42", ""];
        for s in inputs {
            assert_eq!(digest32(s), digest32(s));
            assert_eq!(account_db_id(s), account_db_id(s));
        }
    }

    #[test]
    fn partitions_stay_in_range() {
        for i in 0..500 {
            let key = format!("sample-{}@example.com", i);
            let db = account_db_id(&key);
            assert!((1..=ACCOUNT_DB_COUNT).contains(&db));
            let hash_db = hash_db_id(&key);
            assert!((1..=HASH_DB_COUNT).contains(&hash_db));

            let uid = 9_000_000_000 + i;
            let user_db = game_user_db_id(uid);
            assert!((1..=GAME_USER_DB_COUNT).contains(&user_db));
        }
    }

    #[test]
    fn table_names_are_prefixed_and_one_indexed() {
        let t = account_table(123456);
        let n: u32 = t.strip_prefix("account_").unwrap().parse().unwrap();
        assert!((1..=ACCOUNT_TABLE_COUNT).contains(&n));

        let t = game_user_table(123456);
        let n: u32 = t.strip_prefix("user_").unwrap().parse().unwrap();
        assert!((1..=GAME_USER_TABLE_COUNT).contains(&n));

        let t = delete_apply_table(123456);
        let n: u32 = t.strip_prefix("user_delete_apply_").unwrap().parse().unwrap();
        assert!((1..=DELETE_APPLY_TABLE_COUNT).contains(&n));
    }

    #[test]
    fn spaces_route_independently() {
        // The account row routes by the decimal UID, the hash row by the
        // identity string; nothing forces them to agree.
        let mut differ = false;
        for i in 0..100 {
            let identity = format!("sample-{}@example.com", i);
            let uid = 1_000_000 + i;
            if account_db_id(&identity) != account_db_id(&uid.to_string()) {
                differ = true;
                break;
            }
        }
        assert!(differ);
    }
}
