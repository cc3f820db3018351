// src/db/directory.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_tenant_tx, error::AppError},
    db::{company_repo::CompanyRepository, user_repo::UserRepository},
    models::{
        auth::{Role, User, UserId},
        company::{CompanyId, CompanySummary},
    },
};

/// Leitura de usuários e empresas do tenant, usada pela validação do registro,
/// pela montagem das views e pelo cálculo de destinatários.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Usuários do tenant com os IDs informados (ativos ou não). IDs de outro tenant somem do resultado.
    async fn users(&self, tenant_id: Uuid, ids: &[UserId]) -> Result<Vec<User>, AppError>;

    /// Usuários ativos do tenant com o papel informado.
    async fn users_with_role(&self, tenant_id: Uuid, role: Role) -> Result<Vec<User>, AppError>;

    async fn company(&self, tenant_id: Uuid, id: CompanyId) -> Result<Option<CompanySummary>, AppError>;

    async fn companies(&self, tenant_id: Uuid, ids: &[CompanyId]) -> Result<Vec<CompanySummary>, AppError>;
}

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
    users: UserRepository,
    companies: CompanyRepository,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            companies: CompanyRepository::new(),
            pool,
        }
    }
}

#[async_trait]
impl DirectoryStore for PgDirectory {
    async fn users(&self, tenant_id: Uuid, ids: &[UserId]) -> Result<Vec<User>, AppError> {
        self.users.find_many(tenant_id, ids).await
    }

    async fn users_with_role(&self, tenant_id: Uuid, role: Role) -> Result<Vec<User>, AppError> {
        self.users.list_by_role(tenant_id, role).await
    }

    async fn company(&self, tenant_id: Uuid, id: CompanyId) -> Result<Option<CompanySummary>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let company = self.companies.find_summary(&mut *tx, tenant_id, id).await?;
        tx.commit().await?;
        Ok(company)
    }

    async fn companies(&self, tenant_id: Uuid, ids: &[CompanyId]) -> Result<Vec<CompanySummary>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let companies = self.companies.find_summaries(&mut *tx, tenant_id, ids).await?;
        tx.commit().await?;
        Ok(companies)
    }
}
