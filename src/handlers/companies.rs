// src/handlers/companies.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{BackOffice, RequireRole},
    },
    models::{
        auth::CallerContext,
        company::{Company, CompanyId, CreateCompanyPayload},
    },
};

// GET /api/companies
#[utoipa::path(
    get,
    path = "/api/companies",
    tag = "Companies",
    responses(
        (status = 200, description = "Empresas ativas do tenant", body = Vec<Company>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_companies(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
) -> Result<impl IntoResponse, ApiError> {
    let companies = app_state
        .company_service
        .list(&caller)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(companies)))
}

// POST /api/companies
#[utoipa::path(
    post,
    path = "/api/companies",
    tag = "Companies",
    request_body = CreateCompanyPayload,
    responses(
        (status = 201, description = "Empresa cadastrada", body = Company),
        (status = 400, description = "Dados inválidos"),
        (status = 403, description = "Apenas financeiro ou assistente"),
        (status = 409, description = "Documento já cadastrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_company(
    State(app_state): State<AppState>,
    locale: Locale,
    guard: RequireRole<BackOffice>,
    Json(payload): Json<CreateCompanyPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let company = app_state
        .company_service
        .create(guard.caller(), &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(company)))
}

// DELETE /api/companies/{id}
#[utoipa::path(
    delete,
    path = "/api/companies/{id}",
    tag = "Companies",
    params(("id" = i32, Path, description = "ID da empresa")),
    responses(
        (status = 204, description = "Empresa desativada"),
        (status = 403, description = "Apenas financeiro ou assistente"),
        (status = 404, description = "Empresa não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn disable_company(
    State(app_state): State<AppState>,
    locale: Locale,
    guard: RequireRole<BackOffice>,
    Path(id): Path<CompanyId>,
) -> Result<impl IntoResponse, ApiError> {
    app_state
        .company_service
        .disable(guard.caller(), id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}
