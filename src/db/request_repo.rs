// src/db/request_repo.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    common::{db_utils::begin_tenant_tx, error::AppError},
    models::{
        approval::{Level, Vote},
        auth::UserId,
        request::{
            ApproverEdge, AttachmentHandle, AttachmentKind, Request, RequestScope, VoteEffect, Visibility,
        },
    },
};

/// Persistência do agregado de solicitação.
///
/// Toda operação recebe o tenant explicitamente e nunca devolve linhas de outro tenant.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Grava solicitação + as duas coleções de arestas numa única transação,
    /// consumindo uma unidade da cota mensal do tenant.
    async fn insert(&self, request: &Request) -> Result<(), AppError>;

    async fn find(&self, tenant_id: Uuid, request_id: Uuid) -> Result<Option<Request>, AppError>;

    async fn list(&self, tenant_id: Uuid, scope: &RequestScope) -> Result<Vec<Request>, AppError>;

    /// Aplica o voto de um aprovador com a solicitação travada.
    ///
    /// O efeito (antes/depois e carimbo) é calculado sobre o estado que de fato foi gravado,
    /// então dois votos simultâneos na mesma solicitação nunca enxergam um ao outro desatualizado.
    async fn apply_vote(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        level: Level,
        approver_id: UserId,
        vote: Vote,
        now: DateTime<Utc>,
    ) -> Result<(Request, VoteEffect), AppError>;

    async fn set_attachment_present(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        kind: AttachmentKind,
    ) -> Result<(), AppError>;

    /// Devolve `false` se outra chamada já finalizou a solicitação.
    async fn mark_received(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        finisher_id: UserId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

// ---
// Linhas do banco
// ---

#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    tenant_id: Uuid,
    company_id: i32,
    requester_id: i32,
    finisher_id: Option<i32>,
    invoice_id: Uuid,
    has_invoice: bool,
    budget_id: Uuid,
    has_budget: bool,
    amount: i64,
    note: Option<String>,
    payment_date: NaiveDate,
    created_at: DateTime<Utc>,
    first_level_at: Option<DateTime<Utc>>,
    second_level_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    request_id: Uuid,
    user_id: i32,
    vote: i16,
}

impl EdgeRow {
    fn into_edge(self) -> Result<ApproverEdge, AppError> {
        let vote = Vote::try_from(self.vote).map_err(|e| anyhow::anyhow!(e))?;
        Ok(ApproverEdge { request_id: self.request_id, approver_id: self.user_id, vote })
    }
}

const REQUEST_COLUMNS: &str = r#"
    r.id, r.tenant_id, r.company_id, r.requester_id, r.finisher_id,
    r.invoice_id, r.has_invoice, r.budget_id, r.has_budget,
    r.amount, r.note, r.payment_date, r.created_at,
    r.first_level_at, r.second_level_at, r.finished_at
"#;

fn edge_table(level: Level) -> &'static str {
    match level {
        Level::Manager => "request_managers",
        Level::Director => "request_directors",
    }
}

fn stamp_column(level: Level) -> &'static str {
    match level {
        Level::Manager => "first_level_at",
        Level::Director => "second_level_at",
    }
}

#[derive(Clone)]
pub struct RequestRepository {
    pool: PgPool,
}

impl RequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_edges(
        tx: &mut Transaction<'static, Postgres>,
        level: Level,
        request: &Request,
    ) -> Result<(), AppError> {
        let ids: Vec<i32> = request.edges_at(level).iter().map(|e| e.approver_id).collect();
        if ids.is_empty() {
            return Ok(());
        }

        // Inserção em massa usando UNNEST, preservando a ordem informada
        let sql = format!(
            r#"
            INSERT INTO {} (request_id, user_id, tenant_id, vote, position)
            SELECT $1, u.user_id, $2, 0, (u.ord - 1)::smallint
            FROM UNNEST($3::int4[]) WITH ORDINALITY AS u(user_id, ord)
            "#,
            edge_table(level)
        );

        sqlx::query(&sql)
            .bind(request.id)
            .bind(request.tenant_id)
            .bind(&ids)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn load_edges(
        tx: &mut Transaction<'static, Postgres>,
        level: Level,
        request_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ApproverEdge>>, AppError> {
        let sql = format!(
            "SELECT request_id, user_id, vote FROM {} WHERE request_id = ANY($1) ORDER BY request_id, position",
            edge_table(level)
        );

        let rows = sqlx::query_as::<_, EdgeRow>(&sql)
            .bind(request_ids)
            .fetch_all(&mut **tx)
            .await?;

        let mut by_request: HashMap<Uuid, Vec<ApproverEdge>> = HashMap::new();
        for row in rows {
            let edge = row.into_edge()?;
            by_request.entry(edge.request_id).or_default().push(edge);
        }
        Ok(by_request)
    }

    // Junta as linhas de solicitação com as arestas dos dois níveis
    async fn assemble(
        tx: &mut Transaction<'static, Postgres>,
        rows: Vec<RequestRow>,
    ) -> Result<Vec<Request>, AppError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut managers = Self::load_edges(tx, Level::Manager, &ids).await?;
        let mut directors = Self::load_edges(tx, Level::Director, &ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| Request {
                id: row.id,
                tenant_id: row.tenant_id,
                company_id: row.company_id,
                requester_id: row.requester_id,
                finisher_id: row.finisher_id,
                invoice: AttachmentHandle { id: row.invoice_id, present: row.has_invoice },
                budget: AttachmentHandle { id: row.budget_id, present: row.has_budget },
                amount: row.amount,
                note: row.note,
                payment_date: row.payment_date,
                created_at: row.created_at,
                first_level_at: row.first_level_at,
                second_level_at: row.second_level_at,
                finished_at: row.finished_at,
                managers: managers.remove(&row.id).unwrap_or_default(),
                directors: directors.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl RequestStore for RequestRepository {
    async fn insert(&self, request: &Request) -> Result<(), AppError> {
        let mut tx = begin_tenant_tx(&self.pool, request.tenant_id).await?;

        // 1. Cota: incremento atômico e condicional. Se a transação cair, ele volta junto.
        let quota = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE tenants
            SET current_month_requests = current_month_requests + 1
            WHERE id = $1
              AND is_active
              AND current_month_requests < max_requests_per_month
            RETURNING id
            "#,
        )
        .bind(request.tenant_id)
        .fetch_optional(&mut *tx)
        .await?;

        if quota.is_none() {
            return Err(AppError::QuotaExceeded);
        }

        // 2. A solicitação
        sqlx::query(
            r#"
            INSERT INTO requests (
                id, tenant_id, company_id, requester_id,
                invoice_id, has_invoice, budget_id, has_budget,
                amount, note, payment_date, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(request.id)
        .bind(request.tenant_id)
        .bind(request.company_id)
        .bind(request.requester_id)
        .bind(request.invoice.id)
        .bind(request.invoice.present)
        .bind(request.budget.id)
        .bind(request.budget.present)
        .bind(request.amount)
        .bind(request.note.as_deref())
        .bind(request.payment_date)
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;

        // 3. As arestas (mesma transação: nunca fica meio gravado)
        Self::insert_edges(&mut tx, Level::Manager, request).await?;
        Self::insert_edges(&mut tx, Level::Director, request).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find(&self, tenant_id: Uuid, request_id: Uuid) -> Result<Option<Request>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let sql = format!(
            "SELECT {} FROM requests r WHERE r.tenant_id = $1 AND r.id = $2",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(tenant_id)
            .bind(request_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut requests = Self::assemble(&mut tx, rows).await?;
        tx.commit().await?;

        Ok(requests.pop())
    }

    async fn list(&self, tenant_id: Uuid, scope: &RequestScope) -> Result<Vec<Request>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let (user_filter, include_assigned) = match scope.visibility {
            Visibility::WholeTenant => (None, false),
            Visibility::Involved(user_id) => (Some(user_id), true),
            Visibility::Own(user_id) => (Some(user_id), false),
        };

        let stage_codes: Option<Vec<i16>> = scope
            .stages
            .as_ref()
            .map(|stages| stages.iter().map(|s| i16::from(*s)).collect());

        // O filtro de tenant é sempre aplicado, mesmo quando o cliente informa IDs.
        // A etapa é recalculada a partir das arestas (mesma regra de RequestStage::derive),
        // para o LIMIT valer depois do filtro de etapa.
        let sql = format!(
            r#"
            SELECT {}
            FROM requests r
            CROSS JOIN LATERAL (
                SELECT CASE
                           WHEN bool_or(m.vote = 1) THEN 1
                           WHEN count(*) > 0 AND bool_and(m.vote = -1) THEN -1
                           ELSE 0
                       END AS outcome
                FROM request_managers m
                WHERE m.request_id = r.id
            ) lvl1
            CROSS JOIN LATERAL (
                SELECT CASE
                           WHEN bool_or(d.vote = 1) THEN 1
                           WHEN count(*) > 0 AND bool_and(d.vote = -1) THEN -1
                           ELSE 0
                       END AS outcome,
                       count(*) > 0 AS present
                FROM request_directors d
                WHERE d.request_id = r.id
            ) lvl2
            CROSS JOIN LATERAL (
                SELECT (CASE
                           WHEN lvl1.outcome = -1 OR lvl2.outcome = -1 THEN -1
                           WHEN r.finished_at IS NOT NULL THEN 4
                           WHEN lvl1.outcome = 1 AND (lvl2.outcome = 1 OR NOT lvl2.present) THEN 3
                           WHEN lvl1.outcome = 1 THEN 2
                           ELSE 1
                       END)::int2 AS code
            ) stage
            WHERE r.tenant_id = $1
              AND ($2::uuid[] IS NULL OR r.id = ANY($2))
              AND (
                    $3::int4 IS NULL
                 OR r.requester_id = $3
                 OR ($4 AND EXISTS (
                        SELECT 1 FROM request_managers m WHERE m.request_id = r.id AND m.user_id = $3
                        UNION ALL
                        SELECT 1 FROM request_directors d WHERE d.request_id = r.id AND d.user_id = $3
                    ))
              )
              AND ($6::int2[] IS NULL OR stage.code = ANY($6))
            ORDER BY r.created_at DESC
            LIMIT $5
            "#,
            REQUEST_COLUMNS
        );

        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(tenant_id)
            .bind(scope.ids.as_deref())
            .bind(user_filter)
            .bind(include_assigned)
            .bind(scope.limit)
            .bind(stage_codes)
            .fetch_all(&mut *tx)
            .await?;

        let requests = Self::assemble(&mut tx, rows).await?;
        tx.commit().await?;

        Ok(requests)
    }

    async fn apply_vote(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        level: Level,
        approver_id: UserId,
        vote: Vote,
        now: DateTime<Utc>,
    ) -> Result<(Request, VoteEffect), AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        // 1. Trava a solicitação: votos na mesma solicitação passam um de cada vez
        let sql = format!(
            "SELECT {} FROM requests r WHERE r.tenant_id = $1 AND r.id = $2 FOR UPDATE",
            REQUEST_COLUMNS
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(tenant_id)
            .bind(request_id)
            .fetch_all(&mut *tx)
            .await?;

        let mut request = Self::assemble(&mut tx, rows)
            .await?
            .pop()
            .ok_or(AppError::RequestNotFound(request_id))?;

        // 2. Decide transição e carimbo sobre o estado travado
        let effect = request.cast_vote(approver_id, level, vote, now)?;

        // 3. Só a linha deste aprovador
        let sql = format!(
            "UPDATE {} SET vote = $1 WHERE request_id = $2 AND user_id = $3 AND tenant_id = $4",
            edge_table(level)
        );
        let result = sqlx::query(&sql)
            .bind(i16::from(vote))
            .bind(request_id)
            .bind(approver_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::ApproverNotFound { request_id, approver_id });
        }

        // 4. Carimbo do nível: gravado uma vez, nunca sobrescrito
        if let Some(at) = effect.stamped_at {
            let column = stamp_column(level);
            let sql = format!(
                "UPDATE requests SET {column} = COALESCE({column}, $1) WHERE id = $2 AND tenant_id = $3"
            );
            sqlx::query(&sql)
                .bind(at)
                .bind(request_id)
                .bind(tenant_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((request, effect))
    }

    async fn set_attachment_present(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        kind: AttachmentKind,
    ) -> Result<(), AppError> {
        let column = match kind {
            AttachmentKind::Invoice => "has_invoice",
            AttachmentKind::Budget => "has_budget",
        };

        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;
        let sql = format!("UPDATE requests SET {column} = TRUE WHERE id = $1 AND tenant_id = $2");
        sqlx::query(&sql)
            .bind(request_id)
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    async fn mark_received(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        finisher_id: UserId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE requests
            SET finisher_id = $1, finished_at = $2
            WHERE id = $3 AND tenant_id = $4 AND finished_at IS NULL
            "#,
        )
        .bind(finisher_id)
        .bind(finished_at)
        .bind(request_id)
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
