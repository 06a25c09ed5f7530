/// Login token issuance and verification (HS256 JWT).
use crate::codes;
use crate::error::{AtlasError, AtlasResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const ISSUER: &str = "atlas-account";

pub const TOKEN_TYPE_ACCESS: i32 = 1;
pub const TOKEN_TYPE_REFRESH: i32 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginClaims {
    pub game_id: i64,
    pub platform_id: i64,
    pub channel_id: i64,
    pub uid: i64,
    pub login_time: i64,
    pub token_type: i32,
    pub exp: i64,
    pub iss: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
    pub expire: i64,
}

pub struct TokenIssuer {
    secret: String,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: String, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self { secret, access_ttl_secs, refresh_ttl_secs }
    }

    fn issue(
        &self,
        uid: i64,
        game_id: i64,
        platform_id: i64,
        channel_id: i64,
        token_type: i32,
        ttl_secs: i64,
    ) -> AtlasResult<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = LoginClaims {
            game_id,
            platform_id,
            channel_id,
            uid,
            login_time: now,
            token_type,
            exp: now + ttl_secs,
            iss: ISSUER.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AtlasError::op(codes::BUILD_TOKEN_FAILURE, format!("jwt encode: {}", e)))
    }

    /// Issue the access/refresh pair returned by register and login.
    pub fn issue_pair(
        &self,
        uid: i64,
        game_id: i64,
        platform_id: i64,
        channel_id: i64,
    ) -> AtlasResult<TokenPair> {
        let token = self.issue(
            uid,
            game_id,
            platform_id,
            channel_id,
            TOKEN_TYPE_ACCESS,
            self.access_ttl_secs,
        )?;
        let refresh_token = self.issue(
            uid,
            game_id,
            platform_id,
            channel_id,
            TOKEN_TYPE_REFRESH,
            self.refresh_ttl_secs,
        )?;
        Ok(TokenPair {
            token,
            refresh_token,
            expire: chrono::Utc::now().timestamp() + self.access_ttl_secs,
        })
    }

    pub fn verify(&self, token: &str) -> AtlasResult<LoginClaims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[ISSUER]);
        decode::<LoginClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| AtlasError::Token(e.to_string()))
    }

    /// Verify a login token and require it to belong to `uid`.
    pub fn check_uid(&self, token: &str, uid: i64) -> AtlasResult<LoginClaims> {
        let claims = self.verify(token).map_err(|e| {
            AtlasError::op(codes::LOGIN_TOKEN_PARSE_ERROR, format!("uid {}: {}", uid, e))
        })?;
        if claims.uid != uid {
            return Err(AtlasError::op(
                codes::LOGIN_TOKEN_UID_UNEQUAL,
                format!("token uid {}, request uid {}", claims.uid, uid),
            ));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("a-test-secret-of-sufficient-length!!".to_string(), 7200, 86400)
    }

    #[test]
    fn pair_round_trips() {
        let issuer = issuer();
        let pair = issuer.issue_pair(100_001, 123_456, 101, 1).unwrap();
        let access = issuer.verify(&pair.token).unwrap();
        assert_eq!(access.uid, 100_001);
        assert_eq!(access.game_id, 123_456);
        assert_eq!(access.token_type, TOKEN_TYPE_ACCESS);
        let refresh = issuer.verify(&pair.refresh_token).unwrap();
        assert_eq!(refresh.token_type, TOKEN_TYPE_REFRESH);
    }

    #[test]
    fn uid_mismatch_is_rejected() {
        let issuer = issuer();
        let pair = issuer.issue_pair(100_001, 123_456, 101, 1).unwrap();
        assert!(issuer.check_uid(&pair.token, 100_001).is_ok());
        let err = issuer.check_uid(&pair.token, 200_000).unwrap_err();
        assert_eq!(err.wire_code(), crate::codes::LOGIN_TOKEN_UID_UNEQUAL);
    }

    #[test]
    fn garbage_tokens_fail_to_parse() {
        let err = issuer().check_uid("not-a-token", 1).unwrap_err();
        assert_eq!(err.wire_code(), crate::codes::LOGIN_TOKEN_PARSE_ERROR);
    }

    #[test]
    fn wrong_secret_fails() {
        let pair = issuer().issue_pair(1, 123_456, 101, 1).unwrap();
        let other = TokenIssuer::new("another-secret-of-sufficient-len!!!!".to_string(), 10, 10);
        assert!(other.verify(&pair.token).is_err());
    }
}
