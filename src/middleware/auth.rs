// src/middleware/auth.rs

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{i18n::Locale, tenancy::TenantContext},
    models::auth::{Principal, User},
};

fn locale_of(request: &Request) -> Locale {
    Locale::from_header(
        request
            .headers()
            .get(axum::http::header::ACCEPT_LANGUAGE)
            .and_then(|v| v.to_str().ok()),
    )
}

/// Valida o Bearer token, resolve o tenant da sessão e guarda ambos nos extensions.
///
/// Sem tenant resolvível a requisição para aqui (401): nunca usamos um tenant padrão.
pub async fn tenant_guard(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let locale = locale_of(&request);

    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::InvalidToken.to_api_error(&locale))?;

    let principal = app_state
        .auth_service
        .authenticate(bearer.token())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    let tenant = TenantContext::resolve(Some(&principal))
        .ok_or_else(|| AppError::Unauthorized.to_api_error(&locale))?;

    tracing::debug!(user_id = principal.user.id, tenant_id = %tenant.0, "sessão resolvida");

    request.extensions_mut().insert(tenant);
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

// Extrator para obter o usuário autenticado diretamente nos handlers
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .map(|p| AuthenticatedUser(p.user.clone()))
            .ok_or_else(|| AppError::InvalidToken.to_api_error(&Locale::default()))
    }
}
