/// Configuration management for the account service
use crate::error::{AtlasError, AtlasResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub email: Option<EmailConfig>,
    pub tenants: Vec<TenantConfig>,
    pub apps: Vec<AppKeyConfig>,
    pub holidays: Vec<String>,
    pub white_list: Vec<String>,
    pub jobs: JobsConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub version: String,
}

/// Sharded storage configuration. Each shard lives in its own SQLite
/// database under `data_directory`; partition counts are compile-time
/// constants in the shard router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub max_connections: u32,
}

/// Counter/lock store configuration. An empty URL selects the in-process
/// store (single-instance development mode only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub redis_url: String,
    /// Seed for the account UID counter, applied once with set-if-absent.
    pub uid_seed: i64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    /// Skip request signature verification (development only)
    pub skip_sign_check: bool,
}

/// One limiter rule: [window seconds, threshold, lock seconds]
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitRule {
    pub window_secs: u64,
    pub threshold: i64,
    pub lock_secs: u64,
}

/// Verification-code limiter rule: the account and the caller IP are
/// counted independently within the same window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VerifyCodeRule {
    pub window_secs: u64,
    pub account_threshold: i64,
    pub ip_threshold: i64,
    pub lock_secs: u64,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub ip: LimitRule,
    pub login: LimitRule,
    pub verify_code: VerifyCodeRule,
    pub register: LimitRule,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Per-tenant (game, platform) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub game_id: i64,
    pub platform_id: i64,
    /// Cooling-off period between a deletion request and its execution
    pub delete_cooldown_days: i64,
    pub third_party: Option<ThirdPartyConfig>,
}

/// Third-party identity provider credentials for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub revoke_url: String,
}

/// App key registered for request signature checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppKeyConfig {
    pub app_id: i64,
    pub game_id: i64,
    pub secret_key: String,
}

/// Background job intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub reconcile_interval_secs: u64,
    pub refresh_interval_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_fields(key: &str, raw: &str, n: usize) -> AtlasResult<Vec<u64>> {
    let parts: Vec<&str> = raw.split(',').map(|s| s.trim()).collect();
    if parts.len() != n {
        return Err(AtlasError::Config(format!(
            "{} must have {} comma-separated fields, got '{}'",
            key, n, raw
        )));
    }
    parts
        .iter()
        .map(|p| {
            p.parse()
                .map_err(|_| AtlasError::Config(format!("{}: bad field '{}'", key, p)))
        })
        .collect()
}

fn parse_rule(key: &str, default: LimitRule) -> AtlasResult<LimitRule> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            let f = parse_fields(key, &raw, 3)?;
            Ok(LimitRule {
                window_secs: f[0],
                threshold: f[1] as i64,
                lock_secs: f[2],
            })
        }
    }
}

fn parse_verify_code_rule(key: &str, default: VerifyCodeRule) -> AtlasResult<VerifyCodeRule> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => {
            let f = parse_fields(key, &raw, 4)?;
            Ok(VerifyCodeRule {
                window_secs: f[0],
                account_threshold: f[1] as i64,
                ip_threshold: f[2] as i64,
                lock_secs: f[3],
            })
        }
    }
}

/// Provider credentials for one tenant, from
/// `ATLAS_THIRD_PARTY_{game}_{platform}`: four `|`-separated fields
/// (client id, client secret, token URL, revoke URL).
fn parse_third_party(key: &str, raw: &str) -> AtlasResult<ThirdPartyConfig> {
    let parts: Vec<&str> = raw.splitn(4, '|').map(|s| s.trim()).collect();
    if parts.len() != 4 || parts.iter().any(|p| p.is_empty()) {
        return Err(AtlasError::Config(format!(
            "{} must have 4 |-separated fields, got '{}'",
            key, raw
        )));
    }
    Ok(ThirdPartyConfig {
        client_id: parts[0].to_string(),
        client_secret: parts[1].to_string(),
        token_url: parts[2].to_string(),
        revoke_url: parts[3].to_string(),
    })
}

/// Tenants are listed as `game:platform:cooldown_days` separated by `;`,
/// e.g. `ATLAS_TENANTS=100001:101:7;100002:101:30`.
fn parse_tenants(raw: &str) -> AtlasResult<Vec<TenantConfig>> {
    let mut tenants = Vec::new();
    for entry in raw.split(';').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() != 3 {
            return Err(AtlasError::Config(format!("bad tenant entry '{}'", entry)));
        }
        let parse = |s: &str| -> AtlasResult<i64> {
            s.parse()
                .map_err(|_| AtlasError::Config(format!("bad tenant entry '{}'", entry)))
        };
        tenants.push(TenantConfig {
            game_id: parse(parts[0])?,
            platform_id: parse(parts[1])?,
            delete_cooldown_days: parse(parts[2])?,
            third_party: None,
        });
    }
    Ok(tenants)
}

/// App keys are listed as `app_id:game_id:secret` separated by `;`.
fn parse_apps(raw: &str) -> AtlasResult<Vec<AppKeyConfig>> {
    let mut apps = Vec::new();
    for entry in raw.split(';').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = entry.splitn(3, ':').collect();
        if parts.len() != 3 {
            return Err(AtlasError::Config(format!("bad app key entry '{}'", entry)));
        }
        let parse = |s: &str| -> AtlasResult<i64> {
            s.parse()
                .map_err(|_| AtlasError::Config(format!("bad app key entry '{}'", entry)))
        };
        apps.push(AppKeyConfig {
            app_id: parse(parts[0])?,
            game_id: parse(parts[1])?,
            secret_key: parts[2].to_string(),
        });
    }
    Ok(apps)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AtlasResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env_or("ATLAS_HOSTNAME", "0.0.0.0");
        let port = env_or("ATLAS_PORT", "8300")
            .parse()
            .map_err(|_| AtlasError::Config("Invalid port number".to_string()))?;
        let version = env_or("ATLAS_VERSION", env!("CARGO_PKG_VERSION"));

        let data_directory: PathBuf = env_or("ATLAS_DATA_DIRECTORY", "./data").into();
        let max_connections = env_parse("ATLAS_DB_MAX_CONNECTIONS", 5u32);

        let redis_url = env_or("ATLAS_REDIS_URL", "");
        let uid_seed = env_parse("ATLAS_UID_SEED", 100_000i64);

        let jwt_secret = env::var("ATLAS_JWT_SECRET")
            .map_err(|_| AtlasError::Config("JWT secret required".to_string()))?;
        let access_token_ttl_secs = env_parse("ATLAS_ACCESS_TOKEN_TTL", 7_200i64);
        let refresh_token_ttl_secs = env_parse("ATLAS_REFRESH_TOKEN_TTL", 2_592_000i64);
        let skip_sign_check = env_parse("ATLAS_SKIP_SIGN_CHECK", false);

        let rate_limit = RateLimitConfig {
            enabled: env_parse("ATLAS_RATE_LIMITS_ENABLED", true),
            ip: parse_rule(
                "ATLAS_LIMIT_IP",
                LimitRule { window_secs: 60, threshold: 100, lock_secs: 600 },
            )?,
            login: parse_rule(
                "ATLAS_LIMIT_LOGIN",
                LimitRule { window_secs: 300, threshold: 10, lock_secs: 900 },
            )?,
            verify_code: parse_verify_code_rule(
                "ATLAS_LIMIT_VERIFY_CODE",
                VerifyCodeRule {
                    window_secs: 60,
                    account_threshold: 1,
                    ip_threshold: 20,
                    lock_secs: 600,
                },
            )?,
            register: parse_rule(
                "ATLAS_LIMIT_REGISTER",
                LimitRule { window_secs: 3600, threshold: 20, lock_secs: 3600 },
            )?,
        };

        let email = if let Ok(smtp_url) = env::var("ATLAS_EMAIL_SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env_or("ATLAS_EMAIL_FROM_ADDRESS", "noreply@localhost"),
            })
        } else {
            None
        };

        let mut tenants = parse_tenants(&env_or("ATLAS_TENANTS", ""))?;
        for tenant in &mut tenants {
            let key = format!("ATLAS_THIRD_PARTY_{}_{}", tenant.game_id, tenant.platform_id);
            if let Ok(raw) = env::var(&key) {
                tenant.third_party = Some(parse_third_party(&key, &raw)?);
            }
        }
        let apps = parse_apps(&env_or("ATLAS_APP_KEYS", ""))?;
        let holidays = parse_list(&env_or("ATLAS_HOLIDAYS", ""));
        let white_list = parse_list(&env_or("ATLAS_WHITE_LIST", ""));

        let jobs = JobsConfig {
            reconcile_interval_secs: env_parse("ATLAS_RECONCILE_INTERVAL", 300u64),
            refresh_interval_secs: env_parse("ATLAS_REFRESH_INTERVAL", 600u64),
        };

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port, version },
            storage: StorageConfig { data_directory, max_connections },
            cache: CacheConfig { redis_url, uid_seed },
            auth: AuthConfig {
                jwt_secret,
                access_token_ttl_secs,
                refresh_token_ttl_secs,
                skip_sign_check,
            },
            rate_limit,
            email,
            tenants,
            apps,
            holidays,
            white_list,
            jobs,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AtlasResult<()> {
        if self.auth.jwt_secret.len() < 32 {
            return Err(AtlasError::Config(
                "JWT secret must be at least 32 characters".to_string(),
            ));
        }
        if self.tenants.is_empty() {
            return Err(AtlasError::Config(
                "at least one tenant (ATLAS_TENANTS) must be configured".to_string(),
            ));
        }
        for t in &self.tenants {
            crate::uid::check_tenant_widths(t.game_id, t.platform_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tenant_entries() {
        let tenants = parse_tenants("100001:101:7;100002:102:30").unwrap();
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].game_id, 100001);
        assert_eq!(tenants[1].delete_cooldown_days, 30);
    }

    #[test]
    fn rejects_malformed_tenant_entry() {
        assert!(parse_tenants("100001:101").is_err());
        assert!(parse_tenants("a:b:c").is_err());
    }

    #[test]
    fn parses_third_party_credentials() {
        let third = parse_third_party(
            "ATLAS_THIRD_PARTY_100001_101",
            "com.example.app|secret-jwt|https://appleid.apple.com/auth/token|https://appleid.apple.com/auth/revoke",
        )
        .unwrap();
        assert_eq!(third.client_id, "com.example.app");
        assert_eq!(third.token_url, "https://appleid.apple.com/auth/token");
        assert_eq!(third.revoke_url, "https://appleid.apple.com/auth/revoke");
    }

    #[test]
    fn rejects_malformed_third_party_entry() {
        assert!(parse_third_party("K", "only|three|fields").is_err());
        assert!(parse_third_party("K", "a||c|d").is_err());
    }

    #[test]
    fn parses_app_keys_with_colons_in_secret() {
        let apps = parse_apps("1:100001:se:cr:et").unwrap();
        assert_eq!(apps[0].secret_key, "se:cr:et");
    }
}
