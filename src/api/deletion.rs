/// Deletion application and undo endpoints.
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;

use super::{parse_request, require_tenant, respond, verify_sign, ApiResponse};
use crate::codes;
use crate::context::AppContext;
use crate::error::AtlasResult;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/account/delete_apply", post(delete_apply))
        .route("/account/delete_undo", post(delete_undo))
}

#[derive(Debug, Deserialize, Validate)]
struct DeleteRequest {
    #[allow(dead_code)]
    app_id: i64,
    game_id: i64,
    platform_id: i64,
    uid: i64,
    #[validate(length(min = 1))]
    token: String,
    #[validate(length(min = 1, max = 128))]
    account: String,
    /// Provider details for session revocation, JSON-encoded.
    #[serde(default)]
    third_info: String,
}

async fn delete_apply(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: DeleteRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    let third_info = if request.third_info.is_empty() {
        None
    } else {
        Some(request.third_info.as_str())
    };
    let execute_delete_time = ctx
        .deletion
        .apply(
            request.uid,
            &request.account,
            request.game_id,
            request.platform_id,
            third_info,
        )
        .await?;
    Ok(respond(
        codes::SUCCESS,
        Some(json!({ "execute_delete_time": execute_delete_time })),
    ))
}

async fn delete_undo(
    State(ctx): State<AppContext>,
    Json(payload): Json<serde_json::Value>,
) -> AtlasResult<Json<ApiResponse>> {
    verify_sign(&ctx, &payload)?;
    let request: DeleteRequest = parse_request(payload)?;
    require_tenant(&ctx, request.game_id, request.platform_id)?;
    ctx.tokens.check_uid(&request.token, request.uid)?;

    ctx.deletion
        .undo(
            request.uid,
            &request.account,
            request.game_id,
            request.platform_id,
        )
        .await?;
    Ok(respond(codes::SUCCESS, None))
}
