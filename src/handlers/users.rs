// src/handlers/users.rs

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    models::{
        approval::Level,
        auth::{CallerContext, User, UserSummary},
    },
};

// GET /api/users/me
#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Usuário autenticado", body = User)
    ),
    security(("api_jwt" = []))
)]
pub async fn get_me(user: AuthenticatedUser) -> Result<impl IntoResponse, ApiError> {
    Ok((StatusCode::OK, Json(user.0)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ApproversQuery {
    /// Manager ou Director
    pub level: Level,
}

// GET /api/users/approvers?level=Manager
#[utoipa::path(
    get,
    path = "/api/users/approvers",
    tag = "Users",
    params(ApproversQuery),
    responses(
        (status = 200, description = "Aprovadores ativos do nível", body = Vec<UserSummary>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_approvers(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
    Query(query): Query<ApproversQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let approvers = app_state
        .request_service
        .approvers(&caller, query.level)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(approvers)))
}
