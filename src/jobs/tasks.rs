/// Background task implementations
use crate::{config::ServerConfig, context::AppContext, error::AtlasResult, shard::route};

/// One reconciler sweep; per-row failures are logged inside the manager.
pub async fn reconcile_deletions(ctx: &AppContext) {
    ctx.deletion.reconcile_tick().await;
}

/// Rebuild the tenant registry from the current environment.
pub fn refresh_registry(ctx: &AppContext) -> AtlasResult<()> {
    let config = ServerConfig::from_env()?;
    ctx.tenants.refresh_games(&config.tenants);
    ctx.tenants.refresh_app_keys(&config.apps);
    ctx.tenants.refresh_holidays(&config.holidays);
    ctx.tenants.refresh_white_list(&config.white_list);
    Ok(())
}

/// Health check - verify a representative shard in each space answers.
pub async fn health_check(ctx: &AppContext) -> AtlasResult<()> {
    sqlx::query("SELECT 1")
        .fetch_one(ctx.shards.account_pool_for_uid(1)?)
        .await?;
    sqlx::query("SELECT 1")
        .fetch_one(ctx.shards.hash_pool("health")?)
        .await?;
    for (game_id, platform_id) in ctx.tenants.tenants() {
        for db_id in 1..=route::GAME_USER_DB_COUNT {
            sqlx::query("SELECT 1")
                .fetch_one(ctx.shards.game_user_pool_by_index(game_id, platform_id, db_id)?)
                .await?;
        }
    }
    Ok(())
}
