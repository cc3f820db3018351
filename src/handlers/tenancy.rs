// src/handlers/tenancy.rs

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::tenancy::Tenant,
};

// GET /api/tenant
#[utoipa::path(
    get,
    path = "/api/tenant",
    tag = "Tenancy",
    responses(
        (status = 200, description = "Tenant da sessão com uso e limites do plano", body = Tenant),
        (status = 401, description = "Sessão sem tenant")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_current_tenant(
    State(app_state): State<AppState>,
    locale: Locale,
    tenant: TenantContext,
) -> Result<impl IntoResponse, ApiError> {
    let current = app_state
        .tenant_service
        .current(tenant.0)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(current)))
}
