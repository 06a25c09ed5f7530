/// API routes and handlers
pub mod auth;
pub mod binding;
pub mod captcha;
pub mod credentials;
pub mod deletion;

use crate::codes;
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};
use axum::http::HeaderMap;
use axum::{Json, Router};
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::Serialize;
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(auth::routes())
        .merge(credentials::routes())
        .merge(binding::routes())
        .merge(deletion::routes())
        .merge(captcha::routes())
}

/// Response envelope shared by every endpoint. `code` is the wire contract;
/// HTTP status is 200 for anything the client is expected to handle.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub fn respond(code: i32, data: Option<serde_json::Value>) -> Json<ApiResponse> {
    Json(ApiResponse {
        code,
        message: codes::message(code).to_string(),
        data,
    })
}

/// Caller address: proxies put the original address in X-Forwarded-For.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return real_ip.trim().to_string();
    }
    "unknown".to_string()
}

/// Verify the request signature: md5 over the sorted `key=value&` pairs
/// (excluding `sign`) with the app's secret appended. Skippable in dev.
pub fn verify_sign(ctx: &AppContext, payload: &serde_json::Value) -> AtlasResult<()> {
    if ctx.config.auth.skip_sign_check {
        return Ok(());
    }
    let object = payload.as_object().ok_or_else(|| {
        AtlasError::op(codes::REQUEST_DATA_PARSER_ERROR, "body is not an object".to_string())
    })?;
    let app_id = object
        .get("app_id")
        .and_then(field_as_i64)
        .ok_or_else(|| AtlasError::op(codes::APP_ID_ERROR, "missing app_id".to_string()))?;
    let app = ctx
        .tenants
        .app_key(app_id)
        .ok_or_else(|| AtlasError::op(codes::APP_ID_ERROR, format!("unknown app {app_id}")))?;
    let sign = object
        .get("sign")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AtlasError::op(codes::SIGN_ERROR, "missing sign".to_string()))?;

    let mut keys: Vec<&String> = object.keys().filter(|k| *k != "sign").collect();
    keys.sort();
    let mut buf = String::new();
    for key in keys {
        buf.push_str(key);
        buf.push('=');
        buf.push_str(&field_as_string(&object[key.as_str()]));
        buf.push('&');
    }
    buf.push_str(&app.secret_key);

    let digest = hex::encode(Md5::digest(buf.as_bytes()));
    if !digest.eq_ignore_ascii_case(sign) {
        return Err(AtlasError::op(
            codes::SIGN_ERROR,
            format!("signature mismatch for app {app_id}"),
        ));
    }
    Ok(())
}

/// Parse the signed payload into a typed, validated request.
pub fn parse_request<T: DeserializeOwned + Validate>(payload: serde_json::Value) -> AtlasResult<T> {
    let request: T = serde_json::from_value(payload).map_err(|e| {
        AtlasError::op(codes::REQUEST_DATA_PARSER_ERROR, format!("body parse: {e}"))
    })?;
    request.validate().map_err(|e| {
        AtlasError::op(codes::REQUEST_DATA_VALIDATOR_FAIL, format!("validation: {e}"))
    })?;
    Ok(request)
}

/// Require a configured tenant for the request.
pub fn require_tenant(ctx: &AppContext, game_id: i64, platform_id: i64) -> AtlasResult<()> {
    if ctx.tenants.game(game_id, platform_id).is_none() {
        return Err(AtlasError::op(
            codes::GAME_ID_NOT_EXISTS,
            format!("tenant {game_id}/{platform_id}"),
        ));
    }
    Ok(())
}

fn field_as_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn field_as_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
