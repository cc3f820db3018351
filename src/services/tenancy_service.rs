// src/services/tenancy_service.rs

use std::time::Duration;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{common::error::AppError, db::tenancy_repo::TenantRepository, models::tenancy::Tenant};

/// Meia-noite UTC do primeiro dia do mês de `now`.
pub fn month_start(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single()
}

#[derive(Clone)]
pub struct TenantService {
    tenant_repo: TenantRepository,
}

impl TenantService {
    pub fn new(tenant_repo: TenantRepository) -> Self {
        Self { tenant_repo }
    }

    /// O tenant da sessão. Se sumiu do banco, a sessão não vale mais.
    pub async fn current(&self, tenant_id: Uuid) -> Result<Tenant, AppError> {
        self.tenant_repo.find(tenant_id).await?.ok_or(AppError::Unauthorized)
    }

    pub async fn reset_monthly_usage(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let start = month_start(now)
            .ok_or_else(|| anyhow::anyhow!("início de mês inválido para {}", now))?;
        self.tenant_repo.reset_monthly_usage(start).await
    }

    /// Job de fundo: confere a virada de mês a cada `every` até o token ser cancelado.
    pub fn spawn_monthly_reset(&self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        match service.reset_monthly_usage(Utc::now()).await {
                            Ok(0) => {}
                            Ok(count) => tracing::info!(tenants = count, "contadores mensais zerados"),
                            Err(e) => tracing::warn!(error = %e, "falha ao zerar contadores mensais"),
                        }
                    }
                }
            }
            tracing::debug!("job de reset mensal encerrado");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_start_truncates_to_first_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 15, 42, 7).unwrap();
        assert_eq!(month_start(now), Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).single());
    }

    #[test]
    fn month_start_is_stable_on_the_first() {
        let first = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(month_start(first), Some(first));
    }
}
