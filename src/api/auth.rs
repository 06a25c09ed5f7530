/// Register, login and server-side auth endpoints.
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::{client_ip, parse_request, require_tenant, respond, verify_sign, ApiResponse};
use crate::account::minor;
use crate::account::saga::Credential;
use crate::account::store;
use crate::account::types::{self, ACCOUNT_EMAIL, ACCOUNT_MOBILE};
use crate::codes;
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};
use crate::validation;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/register", post(register))
        .route("/account/login", post(login))
        .route("/account/login_auth", post(login_auth))
        .route("/account/white_list", post(white_list))
        .route("/heartbeat", get(heartbeat))
}

#[derive(Debug, Deserialize, Validate)]
struct AuthRequest {
    #[allow(dead_code)]
    app_id: i64,
    game_id: i64,
    platform_id: i64,
    #[serde(default)]
    channel_id: i64,
    #[validate(length(min = 1, max = 128))]
    account: String,
    #[serde(rename = "type")]
    account_type: i32,
    #[serde(default)]
    password: String,
    #[serde(default)]
    code: String,
}

async fn register(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: AuthRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    validation::check_account_format(request.account_type, &request.account)?;

    let ip = client_ip(&headers);
    ctx.gate.check_register(&ip).await?;

    // Email and mobile registrations must prove ownership with either a
    // password or a delivered code; guests and third parties carry neither.
    let code_used = match request.account_type {
        ACCOUNT_EMAIL | ACCOUNT_MOBILE => {
            if request.password.is_empty() && request.code.is_empty() {
                return Err(AtlasError::op(
                    codes::REGISTER_CODE_AND_PASSWORD_EMPTY,
                    format!("register without credential, type {}", request.account_type),
                ));
            }
            if !request.code.is_empty() {
                ctx.store
                    .check_verify_code(types::CODE_REGISTER, &request.account, &request.code)
                    .await?;
                true
            } else {
                false
            }
        }
        _ => false,
    };

    let password = if request.password.is_empty() {
        None
    } else {
        Some(request.password.as_str())
    };
    let out = ctx
        .saga
        .register(
            &request.account,
            request.account_type,
            password,
            request.game_id,
            request.platform_id,
            request.channel_id,
        )
        .await?;

    if code_used {
        ctx.store
            .consume_verify_code(types::CODE_REGISTER, &request.account)
            .await;
    }
    ctx.gate.record_register(&ip).await?;

    let data = auth_data(&ctx, &out, request.game_id, request.platform_id).await?;
    Ok(respond(out.code, Some(data)))
}

async fn login(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: AuthRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    validation::check_account_format(request.account_type, &request.account)?;

    let ip = client_ip(&headers);
    ctx.gate.check_login(&ip).await?;

    let credential = match request.account_type {
        ACCOUNT_EMAIL | ACCOUNT_MOBILE => {
            if request.password.is_empty() && request.code.is_empty() {
                return Err(AtlasError::op(
                    codes::LOGIN_CODE_AND_PASSWORD_EMPTY,
                    "login without credential".to_string(),
                ));
            }
            if !request.code.is_empty() {
                ctx.store
                    .check_verify_code(types::CODE_LOGIN, &request.account, &request.code)
                    .await?;
                Credential::Verified
            } else {
                Credential::Password(&request.password)
            }
        }
        types::ACCOUNT_USERNAME => Credential::Password(&request.password),
        _ => Credential::Verified,
    };
    let code_used = matches!(credential, Credential::Verified)
        && !request.code.is_empty();

    let out = match ctx
        .saga
        .login(
            &request.account,
            credential,
            request.game_id,
            request.platform_id,
            request.channel_id,
        )
        .await
    {
        Ok(out) => out,
        Err(err) => {
            if err.wire_code() == codes::LOGIN_USER_OR_PASSWORD_ERROR {
                ctx.gate.record_login_failure(&ip, &request.account).await?;
            }
            return Err(err);
        }
    };

    if code_used {
        ctx.store
            .consume_verify_code(types::CODE_LOGIN, &request.account)
            .await;
    }

    let data = auth_data(&ctx, &out, request.game_id, request.platform_id).await?;
    Ok(respond(out.code, Some(data)))
}

#[derive(Debug, Deserialize, Validate)]
struct LoginAuthRequest {
    #[allow(dead_code)]
    app_id: i64,
    uid: i64,
    #[validate(length(min = 1))]
    token: String,
}

/// Server-to-server login verification: the game server forwards the client
/// token and claimed uid.
async fn login_auth(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: LoginAuthRequest = parse_request(payload)?;

    let claims = ctx.tokens.verify(&request.token).map_err(|e| {
        AtlasError::op(codes::LOGIN_AUTH_TOKEN_PARSE_ERROR, format!("uid {}: {e}", request.uid))
    })?;
    if claims.uid != request.uid {
        return Err(AtlasError::op(
            codes::LOGIN_TOKEN_UID_NOT_MATCH,
            format!("token uid {} claimed {}", claims.uid, request.uid),
        ));
    }
    Ok(respond(
        codes::SUCCESS,
        Some(json!({ "uid": claims.uid, "game_id": claims.game_id })),
    ))
}

#[derive(Debug, Deserialize, Validate)]
struct WhiteListRequest {
    #[allow(dead_code)]
    app_id: i64,
    #[serde(default)]
    ip: String,
}

/// Whitelist membership check, used by internal callers before privileged
/// operations.
async fn white_list(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: WhiteListRequest = parse_request(payload)?;
    let addr = if request.ip.is_empty() {
        client_ip(&headers)
    } else {
        request.ip
    };
    if !ctx.tenants.in_white_list(&addr) {
        return Err(AtlasError::op(
            codes::NOT_IN_WHITE_LIST,
            format!("address {addr}"),
        ));
    }
    Ok(respond(codes::SUCCESS, None))
}

async fn heartbeat() -> Json<ApiResponse> {
    respond(
        codes::SUCCESS,
        Some(json!({ "version": env!("CARGO_PKG_VERSION") })),
    )
}

/// Assemble the auth response payload: tokens plus the bound-identity
/// summary and the minor gate for this account.
pub(crate) async fn auth_data(
    ctx: &AppContext,
    out: &crate::account::saga::AuthSuccess,
    game_id: i64,
    platform_id: i64,
) -> AtlasResult<serde_json::Value> {
    // The account row lives under the raw account uid embedded in the
    // composite.
    let (_, _, main_uid) = crate::uid::split_tenant_uid(out.uid);
    let record = ctx.store.get_account(main_uid).await?;
    let (bind_info, gate) = match &record {
        Some(record) => {
            let mut info = ctx.store.bind_info(record, game_id, platform_id).await?;
            info.email = store::mask_identity(&info.email);
            info.mobile = store::mask_identity(&info.mobile);
            let gate = minor::parse_card_id(
                record.is_real_name_verified(),
                &record.card_id,
                chrono::Local::now(),
                |d| ctx.tenants.is_holiday(d),
            );
            (info, gate)
        }
        None => Default::default(),
    };
    Ok(json!({
        "uid": out.uid,
        "token": out.tokens.token,
        "refresh_token": out.tokens.refresh_token,
        "expire": out.tokens.expire,
        "bind_info": bind_info,
        "adult": gate.adult,
        "play_time": gate.play_time,
    }))
}
