// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    middleware::i18n::Locale,
    models::auth::{CallerContext, Role},
};

/// 1. O Trait que define um grupo de papéis autorizados
pub trait RoleSet: Send + Sync + 'static {
    fn allowed() -> &'static [Role];
    fn description() -> &'static str;
}

/// 2. O Extractor (Guardião)
pub struct RequireRole<T>(pub CallerContext, PhantomData<T>);

impl<T> RequireRole<T> {
    pub fn caller(&self) -> &CallerContext {
        &self.0
    }
}

pub fn check_role<T: RoleSet>(caller: &CallerContext) -> Result<(), AppError> {
    if T::allowed().contains(&caller.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "Você precisa ser {} para realizar esta ação.",
            T::description()
        )))
    }
}

// 3. Implementação do FromRequestParts
impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleSet,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = CallerContext::from_request_parts(parts, state).await?;
        check_role::<T>(&caller).map_err(|e| e.to_api_error(&Locale::default()))?;
        Ok(RequireRole(caller, PhantomData))
    }
}

// ---
// DEFINIÇÃO DOS GRUPOS (TIPOS)
// ---

pub struct FinanceOnly;
impl RoleSet for FinanceOnly {
    fn allowed() -> &'static [Role] { &[Role::Finance] }
    fn description() -> &'static str { "do financeiro" }
}

pub struct BackOffice;
impl RoleSet for BackOffice {
    fn allowed() -> &'static [Role] { &[Role::Finance, Role::Assistant] }
    fn description() -> &'static str { "do financeiro ou assistente" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn caller(role: Role) -> CallerContext {
        CallerContext { tenant_id: Uuid::new_v4(), user_id: 1, role }
    }

    #[test]
    fn finance_only_rejects_other_roles() {
        assert!(check_role::<FinanceOnly>(&caller(Role::Finance)).is_ok());
        assert!(matches!(check_role::<FinanceOnly>(&caller(Role::Manager)), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn back_office_accepts_assistants() {
        assert!(check_role::<BackOffice>(&caller(Role::Assistant)).is_ok());
        assert!(check_role::<BackOffice>(&caller(Role::Requester)).is_err());
    }
}
