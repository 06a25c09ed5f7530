/// Abuse-rate limiters over the counter store.
///
/// Every limiter follows the same discipline: an atomic set-if-absent opens
/// the counting window, atomic increments advance it, and crossing the
/// threshold plants a separate lock key with its own TTL. Checks only read
/// lock keys and counters; nothing here is read-then-write.
use crate::cache::{keys, CounterStore};
use crate::codes;
use crate::config::{LimitRule, RateLimitConfig, VerifyCodeRule};
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};
use axum::{extract::Request, extract::State, middleware::Next, response::Response};
use std::sync::Arc;
use std::time::Duration;

/// Paths exempt from the generic IP limiter.
const WHITE_LIST_PATHS: &[&str] = &["/heartbeat", "/captcha/get", "/captcha/verify"];

pub struct AbuseGate {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl AbuseGate {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    async fn lock_is_set(&self, key: &str) -> AtlasResult<bool> {
        Ok(self.store.get(key).await?.as_deref() == Some("1"))
    }

    async fn count_and_lock(&self, counter_key: &str, lock_key: &str, rule: &LimitRule) -> AtlasResult<()> {
        let opened = self
            .store
            .set_nx(counter_key, "1", Some(Duration::from_secs(rule.window_secs)))
            .await?;
        if opened {
            return Ok(());
        }
        let count = self.store.incr(counter_key, None).await?;
        if count >= rule.threshold {
            self.store
                .set(lock_key, "1", Some(Duration::from_secs(rule.lock_secs)))
                .await?;
        }
        Ok(())
    }

    /// Generic per-IP limiter, applied to every non-whitelisted path. While
    /// the lock is up the caller gets code 114; the middleware attaches the
    /// step-up challenge descriptor.
    pub async fn check_ip(&self, ip: &str, path: &str) -> AtlasResult<()> {
        if !self.config.enabled || WHITE_LIST_PATHS.contains(&path) {
            return Ok(());
        }
        let lock_key = format!("{}{}", keys::LIMIT_IP_LOCK, ip);
        if self.lock_is_set(&lock_key).await? {
            return Err(AtlasError::Limited {
                code: codes::LIMIT_IP_TRIGGER,
                challenge: None,
            });
        }
        let counter_key = format!("{}{}", keys::LIMIT_IP, ip);
        self.count_and_lock(&counter_key, &lock_key, &self.config.ip).await
    }

    /// Login is blocked outright while the per-IP login lock is up.
    pub async fn check_login(&self, ip: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let lock_key = format!("{}{}", keys::LIMIT_LOGIN_IP_LOCK, ip);
        if self.lock_is_set(&lock_key).await? {
            return Err(AtlasError::Limited {
                code: codes::LIMIT_LOGIN_IP_LOCK,
                challenge: None,
            });
        }
        Ok(())
    }

    /// Count a failed login against the account; crossing the threshold
    /// locks the caller's IP.
    pub async fn record_login_failure(&self, ip: &str, account: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let counter_key = format!("{}{}", keys::LIMIT_LOGIN_ACCOUNT, account);
        let lock_key = format!("{}{}", keys::LIMIT_LOGIN_IP_LOCK, ip);
        self.count_and_lock(&counter_key, &lock_key, &self.config.login).await
    }

    /// Consulted before sending a verification code.
    pub async fn check_verify_code(&self, ip: &str, account: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let account_key = format!("{}{}", keys::LIMIT_CODE_ACCOUNT, account);
        let count: i64 = self
            .store
            .get(&account_key)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if count >= self.config.verify_code.account_threshold {
            return Err(AtlasError::Limited {
                code: codes::LIMIT_VERIFY_CODE_ACCOUNT,
                challenge: None,
            });
        }
        let ip_lock_key = format!("{}{}", keys::LIMIT_CODE_IP_LOCK, ip);
        if self.lock_is_set(&ip_lock_key).await? {
            return Err(AtlasError::Limited {
                code: codes::LIMIT_VERIFY_CODE_LOCK_IP,
                challenge: None,
            });
        }
        Ok(())
    }

    /// Count a sent verification code against both the account and the IP;
    /// the IP counter crossing its threshold plants the IP lock.
    pub async fn record_verify_code(&self, ip: &str, account: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let rule = &self.config.verify_code;
        let window = Some(Duration::from_secs(rule.window_secs));

        let account_key = format!("{}{}", keys::LIMIT_CODE_ACCOUNT, account);
        if !self.store.set_nx(&account_key, "1", window).await? {
            self.store.incr(&account_key, None).await?;
        }

        let ip_key = format!("{}{}", keys::LIMIT_CODE_IP, ip);
        if !self.store.set_nx(&ip_key, "1", window).await? {
            let count = self.store.incr(&ip_key, None).await?;
            if count >= rule.ip_threshold {
                let lock_key = format!("{}{}", keys::LIMIT_CODE_IP_LOCK, ip);
                self.store
                    .set(&lock_key, "1", Some(Duration::from_secs(rule.lock_secs)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Consulted before allowing a registration.
    pub async fn check_register(&self, ip: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let lock_key = format!("{}{}", keys::LIMIT_REGISTER_IP_LOCK, ip);
        if self.lock_is_set(&lock_key).await? {
            return Err(AtlasError::Limited {
                code: codes::LIMIT_REGISTER_LOCK_IP,
                challenge: None,
            });
        }
        Ok(())
    }

    /// Count a successful registration against the IP.
    pub async fn record_register(&self, ip: &str) -> AtlasResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let counter_key = format!("{}{}", keys::LIMIT_REGISTER_IP, ip);
        let lock_key = format!("{}{}", keys::LIMIT_REGISTER_IP_LOCK, ip);
        self.count_and_lock(&counter_key, &lock_key, &self.config.register).await
    }
}

/// Generic IP limiting as axum middleware. On code 114 the response carries
/// a freshly-allocated CAPTCHA challenge descriptor; verifying it clears the
/// way for the caller once the lock expires.
pub async fn ip_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, AtlasError> {
    let path = request.uri().path().to_string();
    let ip = crate::api::client_ip(request.headers());

    match ctx.gate.check_ip(&ip, &path).await {
        Ok(()) => Ok(next.run(request).await),
        Err(AtlasError::Limited { code, .. }) if code == codes::LIMIT_IP_TRIGGER => {
            let challenge = ctx.captcha.issue("ip").await.ok();
            Err(AtlasError::Limited { code, challenge })
        }
        Err(e) => Err(e),
    }
}
