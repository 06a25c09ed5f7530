/// CAPTCHA step-up endpoints. These paths bypass the IP limiter so a locked
/// caller can still clear itself.
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::{client_ip, respond, ApiResponse};
use crate::cache::keys;
use crate::codes;
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/captcha/get", get(get_captcha))
        .route("/captcha/verify", post(verify_captcha))
}

#[derive(Debug, Deserialize)]
struct GetCaptchaQuery {
    #[serde(default = "default_captcha_type", rename = "type")]
    captcha_type: String,
}

fn default_captcha_type() -> String {
    "ip".to_string()
}

async fn get_captcha(
    State(ctx): State<AppContext>,
    Query(query): Query<GetCaptchaQuery>,
) -> AtlasResult<Json<ApiResponse>> {
    let challenge = ctx.captcha.issue(&query.captcha_type).await?;
    let data = serde_json::to_value(&challenge)
        .map_err(|e| AtlasError::Internal(format!("challenge encode: {e}")))?;
    Ok(respond(codes::SUCCESS, Some(data)))
}

#[derive(Debug, Deserialize)]
struct VerifyCaptchaRequest {
    captcha_id: String,
    answer: String,
}

/// A correct answer clears the caller's generic IP lock and counter, ending
/// the 114 step-up.
async fn verify_captcha(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(request): Json<VerifyCaptchaRequest>,
) -> AtlasResult<Json<ApiResponse>> {
    let passed = ctx.captcha.verify(&request.captcha_id, &request.answer).await?;
    if !passed {
        return Err(AtlasError::op(
            codes::LIMIT_CAPTCHA_ERROR,
            format!("captcha {} failed", request.captcha_id),
        ));
    }
    let ip = client_ip(&headers);
    ctx.counter
        .delete(&format!("{}{}", keys::LIMIT_IP_LOCK, ip))
        .await?;
    ctx.counter
        .delete(&format!("{}{}", keys::LIMIT_IP, ip))
        .await?;
    Ok(respond(codes::SUCCESS, Some(json!({ "passed": true }))))
}
