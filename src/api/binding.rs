/// Identity bind/unbind endpoints plus the bound-identity summary.
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::{parse_request, require_tenant, respond, verify_sign, ApiResponse};
use crate::account::minor;
use crate::account::store;
use crate::account::types::{self, ACCOUNT_EMAIL, ACCOUNT_MOBILE};
use crate::codes;
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};
use crate::validation;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/bind_account", post(bind_account))
        .route("/account/unbind_account", post(unbind_account))
        .route("/account/bind_info", post(bind_info))
}

#[derive(Debug, Deserialize, Validate)]
struct BindRequest {
    #[allow(dead_code)]
    app_id: i64,
    game_id: i64,
    platform_id: i64,
    uid: i64,
    #[validate(length(min = 1))]
    token: String,
    #[validate(length(min = 1, max = 128))]
    account: String,
    #[serde(rename = "type")]
    account_type: i32,
    #[serde(default)]
    code: String,
    /// Optional new password when binding an email or mobile.
    #[serde(default)]
    password: String,
}

async fn bind_account(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: BindRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;
    validation::check_account_format(request.account_type, &request.account)?;

    // Binding an email or mobile requires proving ownership of it.
    let code_used = match request.account_type {
        ACCOUNT_EMAIL | ACCOUNT_MOBILE => {
            ctx.store
                .check_verify_code(types::CODE_BIND, &request.account, &request.code)
                .await?;
            true
        }
        _ => false,
    };

    let password = match request.account_type {
        ACCOUNT_EMAIL | ACCOUNT_MOBILE if !request.password.is_empty() => {
            Some(request.password.as_str())
        }
        _ => None,
    };
    ctx.saga
        .bind(
            request.uid,
            &request.account,
            request.account_type,
            password,
            request.game_id,
            request.platform_id,
        )
        .await?;

    if code_used {
        ctx.store
            .consume_verify_code(types::CODE_BIND, &request.account)
            .await;
    }
    Ok(respond(codes::SUCCESS, None))
}

async fn unbind_account(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: BindRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    ctx.saga
        .unbind(
            request.uid,
            &request.account,
            request.account_type,
            request.game_id,
            request.platform_id,
        )
        .await?;
    Ok(respond(codes::SUCCESS, None))
}

#[derive(Debug, Deserialize, Validate)]
struct BindInfoRequest {
    #[allow(dead_code)]
    app_id: i64,
    game_id: i64,
    platform_id: i64,
    uid: i64,
    #[validate(length(min = 1))]
    token: String,
}

async fn bind_info(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: BindInfoRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    let main_uid =
        crate::uid::main_uid_for_tenant(request.uid, request.game_id, request.platform_id)?;
    let record = ctx.store.get_account(main_uid).await?.ok_or_else(|| {
        AtlasError::op(
            codes::GET_BIND_INFO_NOT_FOUND,
            format!("no account row for {}", request.uid),
        )
    })?;
    let mut info = ctx
        .store
        .bind_info(&record, request.game_id, request.platform_id)
        .await?;
    info.email = store::mask_identity(&info.email);
    info.mobile = store::mask_identity(&info.mobile);

    let gate = minor::parse_card_id(
        record.is_real_name_verified(),
        &record.card_id,
        chrono::Local::now(),
        |d| ctx.tenants.is_holiday(d),
    );
    Ok(respond(
        codes::SUCCESS,
        Some(json!({
            "bind_info": info,
            "register_type": record.register_type,
            "adult": gate.adult,
            "play_time": gate.play_time,
        })),
    ))
}
