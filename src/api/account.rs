/// Account, session, and linked-account endpoints
use crate::{
    account::{
        ChangePasswordRequest, CheckUserRequest, CheckUserResponse, DeleteAccountRequest,
        LinkFamilyRequest, LoginRequest, Profile, RegisterRequest, ResetPasswordRequest,
        SessionResponse, UnlinkFamilyRequest, UpdateProfileRequest,
    },
    api::extract::ApiJson,
    auth::{extract_bearer_token, AuthContext},
    context::AppContext,
    db::models::LinkedAccount,
    error::PocketResult,
};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Build account routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users/check", post(check_user))
        .route("/api/users/register", post(register))
        .route("/api/session", post(login).delete(logout))
        .route("/api/session/check", get(check_session))
        .route("/api/password/reset", post(reset_password))
        .route("/api/me", get(get_profile).patch(update_profile))
        .route("/api/me/password", post(change_password))
        .route("/api/me/delete", post(delete_account))
        .route("/api/links", post(link_family_member))
        .route("/api/links/remove", post(unlink_family_member))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkedAccountsResponse {
    linked_accounts: Vec<LinkedAccount>,
}

fn success() -> Json<Value> {
    Json(json!({ "success": true }))
}

async fn check_user(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<CheckUserRequest>,
) -> PocketResult<Json<CheckUserResponse>> {
    Ok(Json(ctx.user_manager.check_user_exists(&req).await?))
}

async fn register(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> PocketResult<(StatusCode, Json<SessionResponse>)> {
    let session = ctx.user_manager.register(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> PocketResult<Json<SessionResponse>> {
    Ok(Json(ctx.user_manager.login(&req).await?))
}

async fn logout(State(ctx): State<AppContext>, auth: AuthContext) -> PocketResult<Json<Value>> {
    ctx.user_manager.logout(&auth.session).await?;
    Ok(success())
}

/// Session heartbeat
///
/// Always 200; `valid` is false once another login has replaced the session.
async fn check_session(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
) -> PocketResult<Json<Value>> {
    let valid = match extract_bearer_token(&headers) {
        Some(token) => ctx.user_manager.session_is_valid(&token).await?,
        None => false,
    };

    Ok(Json(json!({ "valid": valid })))
}

async fn reset_password(
    State(ctx): State<AppContext>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> PocketResult<Json<Value>> {
    ctx.user_manager.reset_password(req).await?;
    Ok(success())
}

async fn get_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PocketResult<Json<Profile>> {
    Ok(Json(ctx.user_manager.get_profile(&auth.phone).await?))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> PocketResult<Json<Profile>> {
    Ok(Json(
        ctx.user_manager
            .update_profile(&auth.phone, &req.name)
            .await?,
    ))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> PocketResult<Json<Value>> {
    ctx.user_manager.change_password(&auth.phone, req).await?;
    Ok(success())
}

async fn delete_account(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<DeleteAccountRequest>,
) -> PocketResult<Json<Value>> {
    ctx.user_manager
        .delete_account(&auth.phone, &req.password)
        .await?;
    Ok(success())
}

async fn link_family_member(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<LinkFamilyRequest>,
) -> PocketResult<Json<LinkedAccountsResponse>> {
    let linked_accounts = ctx
        .user_manager
        .link_family_member(&auth.phone, &req)
        .await?;
    Ok(Json(LinkedAccountsResponse { linked_accounts }))
}

async fn unlink_family_member(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UnlinkFamilyRequest>,
) -> PocketResult<Json<LinkedAccountsResponse>> {
    let linked_accounts = ctx
        .user_manager
        .unlink_family_member(&auth.phone, &req)
        .await?;
    Ok(Json(LinkedAccountsResponse { linked_accounts }))
}
