/// Tenant registry: per-(game, platform) settings, registered app keys,
/// the holiday table for the minor gate, and the caller IP white list.
///
/// Built once at startup and refreshed by timer jobs; request handlers only
/// read snapshots, so slightly-stale data during a refresh is acceptable.
use crate::config::{AppKeyConfig, ServerConfig, TenantConfig, ThirdPartyConfig};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub game_id: i64,
    pub platform_id: i64,
    pub delete_cooldown_days: i64,
    pub third_party: Option<ThirdPartyConfig>,
    /// When third-party credentials were last rotated into the registry.
    pub rotated_at: i64,
}

#[derive(Debug, Clone)]
pub struct AppKey {
    pub app_id: i64,
    pub game_id: i64,
    pub secret_key: String,
}

#[derive(Default)]
pub struct TenantRegistry {
    games: RwLock<HashMap<(i64, i64), GameConfig>>,
    app_keys: RwLock<HashMap<i64, AppKey>>,
    holidays: RwLock<HashSet<NaiveDate>>,
    white_list: RwLock<HashSet<String>>,
}

impl TenantRegistry {
    pub fn from_config(config: &ServerConfig) -> Self {
        let registry = Self::default();
        registry.refresh_games(&config.tenants);
        registry.refresh_app_keys(&config.apps);
        registry.refresh_holidays(&config.holidays);
        registry.refresh_white_list(&config.white_list);
        registry
    }

    /// Replace the tenant table. Rotation timestamps only move forward when
    /// the third-party credentials actually changed.
    pub fn refresh_games(&self, tenants: &[TenantConfig]) {
        let now = chrono::Utc::now().timestamp();
        let mut games = self.games.write().unwrap();
        for t in tenants {
            let key = (t.game_id, t.platform_id);
            let rotated_at = match games.get(&key) {
                Some(prev) if third_party_eq(&prev.third_party, &t.third_party) => prev.rotated_at,
                _ => now,
            };
            games.insert(
                key,
                GameConfig {
                    game_id: t.game_id,
                    platform_id: t.platform_id,
                    delete_cooldown_days: t.delete_cooldown_days,
                    third_party: t.third_party.clone(),
                    rotated_at,
                },
            );
        }
        games.retain(|key, _| tenants.iter().any(|t| (t.game_id, t.platform_id) == *key));
        info!(tenants = games.len(), "tenant table refreshed");
    }

    pub fn refresh_app_keys(&self, apps: &[AppKeyConfig]) {
        let mut keys = self.app_keys.write().unwrap();
        keys.clear();
        for a in apps {
            keys.insert(
                a.app_id,
                AppKey {
                    app_id: a.app_id,
                    game_id: a.game_id,
                    secret_key: a.secret_key.clone(),
                },
            );
        }
    }

    /// Replace the holiday set; entries that fail to parse are dropped.
    pub fn refresh_holidays(&self, dates: &[String]) {
        let parsed: HashSet<NaiveDate> = dates
            .iter()
            .filter_map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .collect();
        *self.holidays.write().unwrap() = parsed;
    }

    pub fn refresh_white_list(&self, entries: &[String]) {
        *self.white_list.write().unwrap() = entries.iter().cloned().collect();
    }

    pub fn game(&self, game_id: i64, platform_id: i64) -> Option<GameConfig> {
        self.games
            .read()
            .unwrap()
            .get(&(game_id, platform_id))
            .cloned()
    }

    /// Every configured (game, platform) pair; the reconciler fans out over
    /// this list.
    pub fn tenants(&self) -> Vec<(i64, i64)> {
        self.games.read().unwrap().keys().copied().collect()
    }

    pub fn app_key(&self, app_id: i64) -> Option<AppKey> {
        self.app_keys.read().unwrap().get(&app_id).cloned()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.read().unwrap().contains(&date)
    }

    pub fn in_white_list(&self, addr: &str) -> bool {
        self.white_list.read().unwrap().contains(addr)
    }
}

fn third_party_eq(a: &Option<ThirdPartyConfig>, b: &Option<ThirdPartyConfig>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.client_id == b.client_id
                && a.client_secret == b.client_secret
                && a.token_url == b.token_url
                && a.revoke_url == b.revoke_url
        }
        _ => false,
    }
}
