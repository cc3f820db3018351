// src/middleware/tenancy.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    middleware::i18n::Locale,
    models::auth::{CallerContext, Principal},
};

// O tenant da sessão. Só existe depois do `tenant_guard`;
// não há cabeçalho nem campo de corpo que o substitua.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext(pub Uuid);

impl TenantContext {
    /// Resolve o tenant do chamador a partir da autenticação.
    ///
    /// Devolve `None` (negar) quando não há principal, o usuário está desativado, o token
    /// não traz tenant ou o tenant do token não bate com o do cadastro do usuário.
    pub fn resolve(principal: Option<&Principal>) -> Option<TenantContext> {
        let principal = principal?;
        if !principal.user.is_enabled {
            return None;
        }
        let claimed = principal.tenant_claim?;
        (claimed == principal.user.tenant_id).then_some(TenantContext(claimed))
    }
}

fn reject() -> ApiError {
    AppError::Unauthorized.to_api_error(&Locale::default())
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<TenantContext>().copied().ok_or_else(reject)
    }
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts.extensions.get::<TenantContext>().copied().ok_or_else(reject)?;
        let principal = parts.extensions.get::<Principal>().ok_or_else(reject)?;

        Ok(CallerContext {
            tenant_id: tenant.0,
            user_id: principal.user.id,
            role: principal.user.role,
        })
    }
}
