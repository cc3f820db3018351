// tests/common/mod.rs
//
// Implementações em memória das costuras de persistência, anexos e tempo real.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use expense_backend::{
    common::error::AppError,
    db::{DirectoryStore, NotificationStore, RequestStore},
    models::{
        approval::{Level, Vote},
        auth::{CallerContext, Role, User, UserId},
        company::{CompanyId, CompanySummary},
        notification::Notification,
        request::{AttachmentKind, Request, RequestScope, VoteEffect},
    },
    services::{
        attachment_service::AttachmentSink,
        notification_service::NotificationService,
        request_service::{Registration, RequestService},
        stream_hub::RealtimeTransport,
    },
};

// =============================================================================
//  SOLICITAÇÕES
// =============================================================================

#[derive(Default)]
pub struct MemoryRequests {
    rows: Mutex<HashMap<Uuid, Request>>,
    // tenant -> (usadas, limite)
    quotas: Mutex<HashMap<Uuid, (i32, i32)>>,
    insert_delay: Mutex<Option<Duration>>,
    // Atraso depois de ler (o chamador trabalha com um retrato que pode envelhecer)
    read_delay: Mutex<Option<Duration>>,
    // Atraso antes de aplicar um voto (força votos simultâneos a se cruzarem)
    vote_delay: Mutex<Option<Duration>>,
    pub scopes: Mutex<Vec<RequestScope>>,
}

impl MemoryRequests {
    pub fn set_quota(&self, tenant_id: Uuid, used: i32, max: i32) {
        self.quotas.lock().unwrap().insert(tenant_id, (used, max));
    }

    pub fn quota_used(&self, tenant_id: Uuid) -> Option<i32> {
        self.quotas.lock().unwrap().get(&tenant_id).map(|(used, _)| *used)
    }

    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_vote_delay(&self, delay: Duration) {
        *self.vote_delay.lock().unwrap() = Some(delay);
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn stored(&self, id: Uuid) -> Option<Request> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl RequestStore for MemoryRequests {
    async fn insert(&self, request: &Request) -> Result<(), AppError> {
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut quotas = self.quotas.lock().unwrap();
        if let Some((used, max)) = quotas.get_mut(&request.tenant_id) {
            if *used >= *max {
                return Err(AppError::QuotaExceeded);
            }
            *used += 1;
        }
        self.rows.lock().unwrap().insert(request.id, request.clone());
        Ok(())
    }

    async fn find(&self, tenant_id: Uuid, request_id: Uuid) -> Result<Option<Request>, AppError> {
        let found = self
            .rows
            .lock()
            .unwrap()
            .get(&request_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned();

        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(found)
    }

    async fn list(&self, tenant_id: Uuid, scope: &RequestScope) -> Result<Vec<Request>, AppError> {
        self.scopes.lock().unwrap().push(scope.clone());

        let mut found: Vec<Request> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| scope.ids.as_ref().is_none_or(|ids| ids.contains(&r.id)))
            .filter(|r| scope.visibility.allows(r))
            .filter(|r| scope.matches_stage(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = scope.limit {
            found.truncate(limit as usize);
        }
        Ok(found)
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
        let delay = *self.vote_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // Mesmo papel do SELECT ... FOR UPDATE: ler, decidir e gravar sob a trava
        let mut rows = self.rows.lock().unwrap();
        let request = rows
            .get_mut(&request_id)
            .filter(|r| r.tenant_id == tenant_id)
            .ok_or(AppError::RequestNotFound(request_id))?;
        let effect = request.cast_vote(approver_id, level, vote, now)?;
        Ok((request.clone(), effect))
    }

    async fn set_attachment_present(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        kind: AttachmentKind,
    ) -> Result<(), AppError> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(request) = rows.get_mut(&request_id).filter(|r| r.tenant_id == tenant_id) {
            request.mark_attachment_present(kind);
        }
        Ok(())
    }

    async fn mark_received(
        &self,
        tenant_id: Uuid,
        request_id: Uuid,
        finisher_id: UserId,
        finished_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&request_id).filter(|r| r.tenant_id == tenant_id) {
            Some(request) if request.finished_at.is_none() => {
                request.finisher_id = Some(finisher_id);
                request.finished_at = Some(finished_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// =============================================================================
//  DIRETÓRIO
// =============================================================================

#[derive(Default)]
pub struct MemoryDirectory {
    pub users: Vec<User>,
    pub companies: Vec<(Uuid, CompanySummary)>,
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn users(&self, tenant_id: Uuid, ids: &[UserId]) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.tenant_id == tenant_id && ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn users_with_role(&self, tenant_id: Uuid, role: Role) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.tenant_id == tenant_id && u.role == role && u.is_enabled)
            .cloned()
            .collect())
    }

    async fn company(&self, tenant_id: Uuid, id: CompanyId) -> Result<Option<CompanySummary>, AppError> {
        Ok(self
            .companies
            .iter()
            .find(|(t, c)| *t == tenant_id && c.id == id)
            .map(|(_, c)| c.clone()))
    }

    async fn companies(&self, tenant_id: Uuid, ids: &[CompanyId]) -> Result<Vec<CompanySummary>, AppError> {
        Ok(self
            .companies
            .iter()
            .filter(|(t, c)| *t == tenant_id && ids.contains(&c.id))
            .map(|(_, c)| c.clone())
            .collect())
    }
}

// =============================================================================
//  NOTIFICAÇÕES
// =============================================================================

#[derive(Default)]
pub struct MemoryNotifications {
    pub rows: Mutex<Vec<Notification>>,
    pub fail: Mutex<bool>,
    pub delay: Mutex<Option<Duration>>,
}

impl MemoryNotifications {
    pub fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.rows.lock().unwrap().iter().filter(|n| n.user_id == user_id).cloned().collect()
    }

    pub fn for_request(&self, request_id: Uuid) -> Vec<Notification> {
        self.rows.lock().unwrap().iter().filter(|n| n.request_id == request_id).cloned().collect()
    }

    pub fn clear(&self) {
        self.rows.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationStore for MemoryNotifications {
    async fn insert_many(&self, _tenant_id: Uuid, notifications: &[Notification]) -> Result<(), AppError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock().unwrap() {
            return Err(AppError::InternalServerError(anyhow::anyhow!("banco fora do ar")));
        }
        self.rows.lock().unwrap().extend_from_slice(notifications);
        Ok(())
    }

    async fn list_active(
        &self,
        tenant_id: Uuid,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Notification>, AppError> {
        let mut found: Vec<Notification> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.tenant_id == tenant_id && n.user_id == user_id && !n.is_expired(now))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn mark_opened(&self, tenant_id: Uuid, user_id: UserId, id: Uuid) -> Result<bool, AppError> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|n| n.id == id && n.tenant_id == tenant_id && n.user_id == user_id)
        {
            Some(n) => {
                n.is_opened = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// =============================================================================
//  TEMPO REAL
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    User(UserId),
    All(Uuid),
}

#[derive(Default)]
pub struct RecordingTransport {
    pub pushes: Mutex<Vec<(Target, String, Value)>>,
    pub fail: Mutex<bool>,
}

impl RecordingTransport {
    pub fn users_pushed(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .pushes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(t, _, _)| match t {
                Target::User(id) => Some(*id),
                Target::All(_) => None,
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn clear(&self) {
        self.pushes.lock().unwrap().clear();
    }
}

#[async_trait]
impl RealtimeTransport for RecordingTransport {
    async fn push_to_user_group(&self, user_id: UserId, event: &str, payload: Value) -> Result<(), AppError> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::InternalServerError(anyhow::anyhow!("transporte indisponível")));
        }
        self.pushes.lock().unwrap().push((Target::User(user_id), event.to_string(), payload));
        Ok(())
    }

    async fn push_to_all(&self, tenant_id: Uuid, event: &str, payload: Value) -> Result<(), AppError> {
        if *self.fail.lock().unwrap() {
            return Err(AppError::InternalServerError(anyhow::anyhow!("transporte indisponível")));
        }
        self.pushes.lock().unwrap().push((Target::All(tenant_id), event.to_string(), payload));
        Ok(())
    }
}

// =============================================================================
//  ANEXOS
// =============================================================================

#[derive(Default)]
pub struct MemorySink {
    pub writes: Mutex<Vec<(Uuid, AttachmentKind, usize)>>,
    pub fail: Mutex<bool>,
    pub delay: Mutex<Option<Duration>>,
}

#[async_trait]
impl AttachmentSink for MemorySink {
    async fn write_attachment(
        &self,
        _tenant_id: Uuid,
        attachment_id: Uuid,
        kind: AttachmentKind,
        bytes: Vec<u8>,
    ) -> Result<PathBuf, AppError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock().unwrap() {
            return Err(AppError::InternalServerError(anyhow::anyhow!("disco cheio")));
        }
        self.writes.lock().unwrap().push((attachment_id, kind, bytes.len()));
        Ok(PathBuf::from(format!("/mem/{}/{}", kind.as_str(), attachment_id)))
    }
}

// =============================================================================
//  CENÁRIO PADRÃO
// =============================================================================

pub const REQUESTER: UserId = 1;
pub const DIRECTOR_A: UserId = 3;
pub const DIRECTOR_B: UserId = 4;
pub const MANAGER_A: UserId = 5;
pub const MANAGER_B: UserId = 9;
pub const FINANCE: UserId = 77;
pub const ASSISTANT: UserId = 80;
pub const DISABLED_MANAGER: UserId = 90;

pub const COMPANY: CompanyId = 10;
pub const DISABLED_COMPANY: CompanyId = 11;

// Segundo tenant
pub const OTHER_REQUESTER: UserId = 101;
pub const OTHER_MANAGER: UserId = 105;
pub const OTHER_COMPANY: CompanyId = 20;

fn user(id: UserId, tenant_id: Uuid, role: Role, enabled: bool) -> User {
    User {
        id,
        tenant_id,
        full_name: format!("Pessoa {}", id),
        role,
        department: None,
        is_enabled: enabled,
    }
}

fn company(id: CompanyId, enabled: bool) -> CompanySummary {
    CompanySummary {
        id,
        name: format!("Empresa {}", id),
        tax_id: format!("00.000.000/0001-{:02}", id),
        is_enabled: enabled,
    }
}

pub struct Harness {
    pub tenant: Uuid,
    pub other_tenant: Uuid,
    pub requests: Arc<MemoryRequests>,
    pub notifications: Arc<MemoryNotifications>,
    pub transport: Arc<RecordingTransport>,
    pub sink: Arc<MemorySink>,
    pub service: RequestService,
    pub notification_service: NotificationService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(side_effect_timeout: Duration) -> Self {
        let tenant = Uuid::new_v4();
        let other_tenant = Uuid::new_v4();

        let directory = MemoryDirectory {
            users: vec![
                user(REQUESTER, tenant, Role::Requester, true),
                user(DIRECTOR_A, tenant, Role::Director, true),
                user(DIRECTOR_B, tenant, Role::Director, true),
                user(MANAGER_A, tenant, Role::Manager, true),
                user(MANAGER_B, tenant, Role::Manager, true),
                user(FINANCE, tenant, Role::Finance, true),
                user(ASSISTANT, tenant, Role::Assistant, true),
                user(DISABLED_MANAGER, tenant, Role::Manager, false),
                user(OTHER_REQUESTER, other_tenant, Role::Requester, true),
                user(OTHER_MANAGER, other_tenant, Role::Manager, true),
            ],
            companies: vec![
                (tenant, company(COMPANY, true)),
                (tenant, company(DISABLED_COMPANY, false)),
                (other_tenant, company(OTHER_COMPANY, true)),
            ],
        };

        let requests = Arc::new(MemoryRequests::default());
        let notifications = Arc::new(MemoryNotifications::default());
        let transport = Arc::new(RecordingTransport::default());
        let sink = Arc::new(MemorySink::default());

        let notification_service =
            NotificationService::new(notifications.clone(), transport.clone(), chrono::Duration::days(30));
        let service = RequestService::new(
            requests.clone(),
            Arc::new(directory),
            sink.clone(),
            notification_service.clone(),
            side_effect_timeout,
        );

        Self { tenant, other_tenant, requests, notifications, transport, sink, service, notification_service }
    }

    pub fn caller(&self, user_id: UserId, role: Role) -> CallerContext {
        CallerContext { tenant_id: self.tenant, user_id, role }
    }

    pub fn other_caller(&self, user_id: UserId, role: Role) -> CallerContext {
        CallerContext { tenant_id: self.other_tenant, user_id, role }
    }

    pub fn clear_side_effects(&self) {
        self.notifications.clear();
        self.transport.clear();
    }
}

pub fn registration(managers: &[UserId], directors: &[UserId]) -> Registration {
    Registration {
        company_id: COMPANY,
        amount: 25_000,
        payment_date: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
        note: Some("Hospedagem".into()),
        manager_ids: managers.to_vec(),
        director_ids: directors.to_vec(),
        invoice: None,
        budget: None,
    }
}

pub fn token() -> CancellationToken {
    CancellationToken::new()
}
