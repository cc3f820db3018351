// src/db/tenancy_repo.rs

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{common::error::AppError, models::tenancy::Tenant};

#[derive(Clone)]
pub struct TenantRepository {
    pool: PgPool,
}

impl TenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, plan, current_month_requests, current_users,
                   max_requests_per_month, max_users, is_active, usage_reset_at, created_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Zera o contador mensal de todos os tenants cujo último reset é anterior ao
    /// início do mês corrente. Idempotente: rodar duas vezes no mesmo mês não faz nada.
    pub async fn reset_monthly_usage(&self, month_start: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET current_month_requests = 0, usage_reset_at = $1
            WHERE usage_reset_at < $1
            "#,
        )
        .bind(month_start)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
