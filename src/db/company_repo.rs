// src/db/company_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::company::{Company, CompanyId, CompanySummary, CreateCompanyPayload},
};

const COMPANY_COLUMNS: &str = r#"
    id, tenant_id, name, tax_id,
    postal_code, state, city, neighborhood, street, number, complement,
    phone, email, is_enabled, created_at
"#;

// Sem pool próprio: o serviço abre a transação com o tenant já configurado
// e passa o executor.
#[derive(Clone, Default)]
pub struct CompanyRepository;

impl CompanyRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn list_enabled<'e, E>(&self, executor: E, tenant_id: Uuid) -> Result<Vec<Company>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM companies WHERE tenant_id = $1 AND is_enabled = TRUE ORDER BY name ASC",
            COMPANY_COLUMNS
        );
        let companies = sqlx::query_as::<_, Company>(&sql)
            .bind(tenant_id)
            .fetch_all(executor)
            .await?;
        Ok(companies)
    }

    pub async fn find_summary<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        id: CompanyId,
    ) -> Result<Option<CompanySummary>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let summary = sqlx::query_as::<_, CompanySummary>(
            "SELECT id, name, tax_id, is_enabled FROM companies WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(summary)
    }

    pub async fn find_summaries<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        ids: &[CompanyId],
    ) -> Result<Vec<CompanySummary>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let summaries = sqlx::query_as::<_, CompanySummary>(
            "SELECT id, name, tax_id, is_enabled FROM companies WHERE tenant_id = $1 AND id = ANY($2)",
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(executor)
        .await?;
        Ok(summaries)
    }

    pub async fn create<'e, E>(
        &self,
        executor: E,
        tenant_id: Uuid,
        payload: &CreateCompanyPayload,
    ) -> Result<Company, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO companies (
                tenant_id, name, tax_id,
                postal_code, state, city, neighborhood, street, number, complement,
                phone, email
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            COMPANY_COLUMNS
        );

        let address = &payload.address;
        sqlx::query_as::<_, Company>(&sql)
            .bind(tenant_id)
            .bind(&payload.name)
            .bind(&payload.tax_id)
            .bind(&address.postal_code)
            .bind(&address.state)
            .bind(&address.city)
            .bind(&address.neighborhood)
            .bind(&address.street)
            .bind(&address.number)
            .bind(address.complement.as_deref())
            .bind(payload.phone.as_deref())
            .bind(payload.email.as_deref())
            .fetch_one(executor)
            .await
            .map_err(|e| {
                // CNPJ duplicado dentro do mesmo tenant
                if let sqlx::Error::Database(db_err) = &e {
                    if db_err.is_unique_violation() {
                        return AppError::Conflict(format!(
                            "Já existe uma empresa com o documento '{}'.",
                            payload.tax_id
                        ));
                    }
                }
                e.into()
            })
    }

    /// Desativa (não remove): solicitações antigas continuam apontando para a empresa.
    pub async fn disable<'e, E>(&self, executor: E, tenant_id: Uuid, id: CompanyId) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("UPDATE companies SET is_enabled = FALSE WHERE tenant_id = $1 AND id = $2")
            .bind(tenant_id)
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
