/// Account UID allocation and tenant UID composition.
///
/// Account UIDs come from a shared counter so they are strictly increasing
/// across all instances and never reused, even over restarts (the seed is
/// applied with set-if-absent, so it only takes effect on first boot).
///
/// A tenant UID embeds the tenant as a fixed-width decimal prefix:
/// 6 digits of game id, 3 digits of platform id, then the account UID in the
/// low 10 digits. It is reversible by decimal slicing.
use crate::cache::{keys, CounterStore};
use crate::codes;
use crate::error::{AtlasError, AtlasResult};
use std::sync::Arc;
use tracing::info;

const ACCOUNT_UID_SPAN: i64 = 10_000_000_000; // 10 digits
const PLATFORM_SPAN: i64 = 1_000; // 3 digits
const GAME_SPAN: i64 = 1_000_000; // 6 digits

pub struct UidAllocator {
    store: Arc<dyn CounterStore>,
}

impl UidAllocator {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Apply the configured seed if the counter does not exist yet.
    pub async fn seed(&self, seed: i64) -> AtlasResult<()> {
        let applied = self
            .store
            .set_nx(keys::UID_COUNTER, &seed.to_string(), None)
            .await?;
        if applied {
            info!(seed, "account uid counter seeded");
        }
        Ok(())
    }

    /// Allocate the next account UID.
    pub async fn allocate(&self) -> AtlasResult<i64> {
        let uid = self.store.incr(keys::UID_COUNTER, None).await?;
        if uid <= 0 {
            return Err(AtlasError::op(
                codes::BUILD_ACCOUNT_UID_ERROR,
                format!("uid counter returned {}", uid),
            ));
        }
        Ok(uid)
    }
}

/// Reject game/platform ids that do not fit their fixed widths.
pub fn check_tenant_widths(game_id: i64, platform_id: i64) -> AtlasResult<()> {
    if !(1..GAME_SPAN).contains(&game_id) {
        return Err(AtlasError::Config(format!(
            "game id {} does not fit in 6 digits",
            game_id
        )));
    }
    if !(1..PLATFORM_SPAN).contains(&platform_id) {
        return Err(AtlasError::Config(format!(
            "platform id {} does not fit in 3 digits",
            platform_id
        )));
    }
    Ok(())
}

/// Compose the per-tenant composite UID.
pub fn compose_tenant_uid(account_uid: i64, game_id: i64, platform_id: i64) -> AtlasResult<i64> {
    check_tenant_widths(game_id, platform_id)?;
    if !(1..ACCOUNT_UID_SPAN).contains(&account_uid) {
        return Err(AtlasError::op(
            codes::BUILD_ACCOUNT_UID_ERROR,
            format!("account uid {} does not fit in 10 digits", account_uid),
        ));
    }
    Ok((game_id * PLATFORM_SPAN + platform_id) * ACCOUNT_UID_SPAN + account_uid)
}

/// Slice a tenant UID back into (game_id, platform_id, account_uid).
pub fn split_tenant_uid(tenant_uid: i64) -> (i64, i64, i64) {
    let account_uid = tenant_uid % ACCOUNT_UID_SPAN;
    let prefix = tenant_uid / ACCOUNT_UID_SPAN;
    (prefix / PLATFORM_SPAN, prefix % PLATFORM_SPAN, account_uid)
}

/// Recover the account UID from a client-supplied tenant UID, rejecting a
/// UID whose embedded prefix names a different tenant than the request.
pub fn main_uid_for_tenant(tenant_uid: i64, game_id: i64, platform_id: i64) -> AtlasResult<i64> {
    let (embedded_game, embedded_platform, account_uid) = split_tenant_uid(tenant_uid);
    if embedded_game != game_id || embedded_platform != platform_id {
        return Err(AtlasError::op(
            codes::REQUEST_DATA_INCORRECT,
            format!(
                "uid {tenant_uid} belongs to tenant {embedded_game}/{embedded_platform}, \
                 request names {game_id}/{platform_id}"
            ),
        ));
    }
    Ok(account_uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;

    #[tokio::test]
    async fn allocation_is_strictly_increasing_from_seed() {
        let allocator = UidAllocator::new(Arc::new(MemoryStore::new()));
        allocator.seed(100_000).await.unwrap();
        // Seeding twice changes nothing.
        allocator.seed(5).await.unwrap();

        let a = allocator.allocate().await.unwrap();
        let b = allocator.allocate().await.unwrap();
        assert_eq!(a, 100_001);
        assert_eq!(b, 100_002);
    }

    #[test]
    fn tenant_uid_round_trips_by_decimal_slicing() {
        let tenant_uid = compose_tenant_uid(100_001, 123_456, 101).unwrap();
        assert_eq!(split_tenant_uid(tenant_uid), (123_456, 101, 100_001));
    }

    #[test]
    fn composition_is_prefix_stable() {
        let a = compose_tenant_uid(1, 100_001, 101).unwrap();
        let b = compose_tenant_uid(9_999_999_999, 100_001, 101).unwrap();
        // Same tenant prefix regardless of account uid.
        assert_eq!(a / 10_000_000_000, b / 10_000_000_000);
    }

    #[test]
    fn tenant_uid_from_other_tenant_is_rejected() {
        let tenant_uid = compose_tenant_uid(100_001, 123_456, 101).unwrap();
        assert_eq!(main_uid_for_tenant(tenant_uid, 123_456, 101).unwrap(), 100_001);
        assert!(main_uid_for_tenant(tenant_uid, 123_457, 101).is_err());
        assert!(main_uid_for_tenant(tenant_uid, 123_456, 102).is_err());
    }

    #[test]
    fn oversized_ids_are_config_errors() {
        assert!(compose_tenant_uid(1, 1_000_000, 101).is_err());
        assert!(compose_tenant_uid(1, 100_001, 1_000).is_err());
        assert!(compose_tenant_uid(10_000_000_000, 100_001, 101).is_err());
        assert!(check_tenant_widths(0, 101).is_err());
    }
}
