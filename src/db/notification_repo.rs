// src/db/notification_repo.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_tenant_tx, error::AppError},
    models::{auth::UserId, notification::Notification},
};

/// As linhas de notificação são a fonte de verdade de "quem foi avisado".
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_many(&self, tenant_id: Uuid, notifications: &[Notification]) -> Result<(), AppError>;

    /// Notificações ainda válidas do usuário, mais recentes primeiro.
    async fn list_active(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError>;

    /// `false` quando a notificação não existe ou pertence a outro usuário.
    async fn mark_opened(&self, tenant_id: Uuid, user_id: UserId, id: Uuid) -> Result<bool, AppError>;
}

#[derive(Clone)]
pub struct NotificationRepository {
    pool: PgPool,
}

impl NotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for NotificationRepository {
    async fn insert_many(&self, tenant_id: Uuid, notifications: &[Notification]) -> Result<(), AppError> {
        if notifications.is_empty() {
            return Ok(());
        }

        // Colunas separadas em arrays para um único INSERT ... UNNEST
        let ids: Vec<Uuid> = notifications.iter().map(|n| n.id).collect();
        let request_ids: Vec<Uuid> = notifications.iter().map(|n| n.request_id).collect();
        let user_ids: Vec<i32> = notifications.iter().map(|n| n.user_id).collect();
        let messages: Vec<String> = notifications.iter().map(|n| n.message.clone()).collect();
        let created: Vec<DateTime<Utc>> = notifications.iter().map(|n| n.created_at).collect();
        let expires: Vec<DateTime<Utc>> = notifications.iter().map(|n| n.expires_at).collect();

        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        sqlx::query(
            r#"
            INSERT INTO notifications (id, tenant_id, request_id, user_id, message, created_at, expires_at)
            SELECT n.id, $1, n.request_id, n.user_id, n.message, n.created_at, n.expires_at
            FROM UNNEST($2::uuid[], $3::uuid[], $4::int4[], $5::text[], $6::timestamptz[], $7::timestamptz[])
                AS n(id, request_id, user_id, message, created_at, expires_at)
            "#,
        )
        .bind(tenant_id)
        .bind(&ids)
        .bind(&request_ids)
        .bind(&user_ids)
        .bind(&messages)
        .bind(&created)
        .bind(&expires)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let notifications = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, tenant_id, request_id, user_id, message, created_at, expires_at, is_opened
            FROM notifications
            WHERE tenant_id = $1 AND user_id = $2 AND expires_at > $3
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(notifications)
    }

    async fn mark_opened(&self, tenant_id: Uuid, user_id: UserId, id: Uuid) -> Result<bool, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let result = sqlx::query(
            "UPDATE notifications SET is_opened = TRUE WHERE id = $1 AND tenant_id = $2 AND user_id = $3",
        )
        .bind(id)
        .bind(tenant_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
