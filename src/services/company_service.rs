// src/services/company_service.rs

use sqlx::PgPool;

use crate::{
    common::{db_utils::begin_tenant_tx, error::AppError},
    db::company_repo::CompanyRepository,
    middleware::rbac::{check_role, BackOffice},
    models::{
        auth::CallerContext,
        company::{Company, CompanyId, CreateCompanyPayload},
    },
};

#[derive(Clone)]
pub struct CompanyService {
    repo: CompanyRepository,
    pool: PgPool, // Usamos a pool para iniciar transações com o tenant
}

impl CompanyService {
    pub fn new(repo: CompanyRepository, pool: PgPool) -> Self {
        Self { repo, pool }
    }

    pub async fn list(&self, caller: &CallerContext) -> Result<Vec<Company>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, caller.tenant_id).await?;
        let companies = self.repo.list_enabled(&mut *tx, caller.tenant_id).await?;
        tx.commit().await?;
        Ok(companies)
    }

    pub async fn create(&self, caller: &CallerContext, payload: &CreateCompanyPayload) -> Result<Company, AppError> {
        check_role::<BackOffice>(caller)?;

        let mut tx = begin_tenant_tx(&self.pool, caller.tenant_id).await?;
        let company = self.repo.create(&mut *tx, caller.tenant_id, payload).await?;
        tx.commit().await?;

        tracing::info!(company_id = company.id, tenant_id = %caller.tenant_id, "empresa cadastrada");
        Ok(company)
    }

    /// Desativação lógica. Solicitações já registradas continuam válidas.
    pub async fn disable(&self, caller: &CallerContext, id: CompanyId) -> Result<(), AppError> {
        check_role::<BackOffice>(caller)?;

        let mut tx = begin_tenant_tx(&self.pool, caller.tenant_id).await?;
        let disabled = self.repo.disable(&mut *tx, caller.tenant_id, id).await?;
        tx.commit().await?;

        if !disabled {
            return Err(AppError::CompanyNotFound(id));
        }
        tracing::info!(company_id = id, tenant_id = %caller.tenant_id, "empresa desativada");
        Ok(())
    }
}
