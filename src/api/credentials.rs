/// Verification codes, password recovery and real-name verification.
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::warn;
use validator::Validate;

use super::{client_ip, parse_request, respond, verify_sign, ApiResponse};
use crate::account::store;
use crate::account::types::{self, ACCOUNT_EMAIL, ACCOUNT_MOBILE};
use crate::codes;
use crate::context::AppContext;
use crate::error::{AtlasError, AtlasResult};
use crate::validation;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/send_code", post(send_code))
        .route("/account/forget_password", post(forget_password))
        .route("/account/change_password", post(change_password))
        .route("/account/real_name_auth", post(real_name_auth))
}

fn purpose_label(purpose: i32) -> &'static str {
    match purpose {
        types::CODE_REGISTER => "registration",
        types::CODE_LOGIN => "login",
        types::CODE_FORGET_PASSWORD => "password recovery",
        types::CODE_BIND => "account binding",
        types::CODE_DELETE => "account deletion",
        _ => "verification",
    }
}

#[derive(Debug, Deserialize, Validate)]
struct SendCodeRequest {
    #[allow(dead_code)]
    app_id: i64,
    #[validate(length(min = 1, max = 128))]
    account: String,
    #[serde(rename = "type")]
    account_type: i32,
    code_type: i32,
}

async fn send_code(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: SendCodeRequest = parse_request(payload)?;
    if !(types::CODE_REGISTER..=types::CODE_DELETE).contains(&request.code_type) {
        return Err(AtlasError::op(
            codes::VERIFY_CODE_TYPE_UNKNOWN,
            format!("code type {}", request.code_type),
        ));
    }
    if request.account_type != ACCOUNT_EMAIL && request.account_type != ACCOUNT_MOBILE {
        return Err(AtlasError::op(
            codes::REQUEST_DATA_INCORRECT,
            format!("codes go to email or mobile, got type {}", request.account_type),
        ));
    }
    validation::check_account_format(request.account_type, &request.account)?;

    // Codes for a new identity require it to be free; codes for an existing
    // account require it to be taken.
    let exists = ctx.store.get_uid_by_account(&request.account).await?.is_some();
    match request.code_type {
        types::CODE_REGISTER | types::CODE_BIND if exists => {
            return Err(AtlasError::op(
                codes::SEND_CODE_ACCOUNT_ALREADY_EXISTS,
                format!("code type {} for taken identity", request.code_type),
            ));
        }
        types::CODE_LOGIN | types::CODE_FORGET_PASSWORD | types::CODE_DELETE if !exists => {
            return Err(AtlasError::op(
                codes::SEND_CODE_ACCOUNT_NOT_EXISTS,
                format!("code type {} for unknown identity", request.code_type),
            ));
        }
        _ => {}
    }

    let ip = client_ip(&headers);
    ctx.gate.check_verify_code(&ip, &request.account).await?;

    let code = store::gen_verify_code();
    ctx.store
        .put_verify_code(request.code_type, &request.account, &code)
        .await
        .map_err(|e| AtlasError::op(codes::VERIFY_CODE_INSERT_ERROR, format!("store: {e}")))?;

    match request.account_type {
        ACCOUNT_EMAIL => {
            ctx.mailer
                .send_verify_code(&request.account, &code, purpose_label(request.code_type))
                .await?;
        }
        _ => {
            // SMS delivery goes through an external gateway not wired here.
            warn!(account = %request.account, "no SMS provider configured, code not delivered");
        }
    }

    ctx.gate.record_verify_code(&ip, &request.account).await?;
    Ok(respond(codes::SUCCESS, None))
}

#[derive(Debug, Deserialize, Validate)]
struct ForgetPasswordRequest {
    #[allow(dead_code)]
    app_id: i64,
    #[validate(length(min = 1, max = 128))]
    account: String,
    #[serde(rename = "type")]
    account_type: i32,
    #[validate(length(min = 6))]
    code: String,
    #[validate(length(min = 6, max = 64))]
    password: String,
}

async fn forget_password(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: ForgetPasswordRequest = parse_request(payload)?;
    validation::check_account_format(request.account_type, &request.account)?;

    ctx.store
        .check_verify_code(types::CODE_FORGET_PASSWORD, &request.account, &request.code)
        .await?;
    let uid = ctx
        .store
        .get_uid_by_account(&request.account)
        .await?
        .ok_or_else(|| {
            AtlasError::op(
                codes::FORGET_PASSWORD_ACCOUNT_NOT_EXISTS,
                "password reset for unknown identity".to_string(),
            )
        })?;
    ctx.store
        .update_password(uid, &request.password, codes::FORGET_PASSWORD_UPDATE_FAILURE)
        .await?;
    ctx.store
        .consume_verify_code(types::CODE_FORGET_PASSWORD, &request.account)
        .await;
    Ok(respond(codes::SUCCESS, None))
}

#[derive(Debug, Deserialize, Validate)]
struct ChangePasswordRequest {
    #[allow(dead_code)]
    app_id: i64,
    uid: i64,
    #[validate(length(min = 1, max = 128))]
    account: String,
    #[validate(length(min = 1))]
    old_password: String,
    #[validate(length(min = 6, max = 64))]
    password: String,
    #[validate(length(min = 1))]
    token: String,
}

async fn change_password(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: ChangePasswordRequest = parse_request(payload)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    let record = ctx
        .store
        .get_account_by_identity(&request.account)
        .await?
        .ok_or_else(|| {
            AtlasError::op(
                codes::CHANGE_PASSWORD_ACCOUNT_NOT_EXISTS,
                "password change for unknown identity".to_string(),
            )
        })?;
    // The request carries the composite tenant uid; the account row carries
    // the raw uid embedded in it.
    let (_, _, main_uid) = crate::uid::split_tenant_uid(request.uid);
    if record.uid != main_uid {
        return Err(AtlasError::op(
            codes::CHANGE_PASSWORD_UID_NOT_MATCH,
            format!("identity owned by {}, requested by {}", record.uid, request.uid),
        ));
    }
    if !store::verify_password(&record, &request.old_password) {
        return Err(AtlasError::op(
            codes::OLD_PASSWORD_ERROR,
            format!("old password mismatch, uid {}", record.uid),
        ));
    }
    ctx.store
        .update_password(
            record.uid,
            &request.password,
            codes::CHANGE_PASSWORD_UPDATE_FAILURE,
        )
        .await?;
    Ok(respond(codes::SUCCESS, None))
}

#[derive(Debug, Deserialize, Validate)]
struct RealNameRequest {
    #[allow(dead_code)]
    app_id: i64,
    uid: i64,
    #[validate(length(min = 1, max = 128))]
    account: String,
    name: String,
    card_id: String,
    #[validate(length(min = 1))]
    token: String,
}

async fn real_name_auth(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: RealNameRequest = parse_request(payload)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    if request.name.is_empty() || request.name.chars().count() > 32 {
        return Err(AtlasError::op(
            codes::REAL_NAME_NAME_ERROR,
            format!("name length {}", request.name.chars().count()),
        ));
    }
    if !validation::is_valid_card_id(&request.card_id) {
        return Err(AtlasError::op(
            codes::REAL_NAME_CARD_ID_ERROR,
            "malformed card id".to_string(),
        ));
    }

    let uid = ctx
        .store
        .get_uid_by_account(&request.account)
        .await?
        .ok_or_else(|| {
            AtlasError::op(
                codes::REAL_NAME_ACCOUNT_NOT_EXISTS,
                "real-name for unknown identity".to_string(),
            )
        })?;
    let (_, _, main_uid) = crate::uid::split_tenant_uid(request.uid);
    if uid != main_uid {
        return Err(AtlasError::op(
            codes::REQUEST_DATA_INCORRECT,
            format!("identity owned by {uid}, requested by {}", request.uid),
        ));
    }
    ctx.store
        .set_real_name(uid, &request.name, &request.card_id)
        .await?;
    Ok(respond(codes::SUCCESS, None))
}
