// src/services/notification_service.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::notification_repo::NotificationStore,
    models::{
        approval::{Level, Outcome},
        auth::{CallerContext, UserId},
        notification::{
            Notification, NotificationMessage, EVENT_NOTIFICATIONS_CHANGED, EVENT_REQUESTS_CHANGED,
        },
        request::{Request, VoteEffect},
    },
    services::stream_hub::RealtimeTransport,
};

// =============================================================================
//  DESTINATÁRIOS
// =============================================================================

/// Uma rodada de avisos sobre uma solicitação: cada destinatário aparece uma única vez.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fanout {
    pub tenant_id: Uuid,
    pub request_id: Uuid,
    pub deliveries: Vec<(UserId, NotificationMessage)>,
}

impl Fanout {
    fn new(request: &Request) -> Self {
        Self { tenant_id: request.tenant_id, request_id: request.id, deliveries: Vec::new() }
    }

    // O primeiro motivo registrado para um usuário vence
    fn add(&mut self, user_id: UserId, message: NotificationMessage) {
        if !self.deliveries.iter().any(|(id, _)| *id == user_id) {
            self.deliveries.push((user_id, message));
        }
    }

    pub fn recipients(&self) -> BTreeSet<UserId> {
        self.deliveries.iter().map(|(id, _)| *id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Criação: solicitante + todos os gestores + todos os diretores.
    pub fn on_created(request: &Request) -> Self {
        let mut fanout = Self::new(request);
        fanout.add(request.requester_id, NotificationMessage::Created);
        for edge in &request.managers {
            fanout.add(edge.approver_id, NotificationMessage::AwaitingReview);
        }
        for edge in &request.directors {
            fanout.add(edge.approver_id, NotificationMessage::Created);
        }
        fanout
    }

    /// Voto: só há aviso quando o resultado do nível mudou.
    ///
    /// Solicitante sempre; diretores quando o primeiro nível acabou de ser aprovado
    /// e existe segundo nível; financeiro quando a solicitação inteira acabou de ser aprovada.
    pub fn on_vote(request: &Request, effect: &VoteEffect, finance_ids: &[UserId]) -> Self {
        let mut fanout = Self::new(request);
        if !effect.level_changed() {
            return fanout;
        }

        let outcome = match effect.level {
            Level::Manager => effect.after.first,
            Level::Director => effect.after.second,
        };
        fanout.add(
            request.requester_id,
            NotificationMessage::LevelDecided { level: effect.level, outcome },
        );

        let first_just_approved =
            effect.first_changed() && effect.after.first == Outcome::Approved;
        if first_just_approved && request.has_second_level() {
            for edge in &request.directors {
                fanout.add(edge.approver_id, NotificationMessage::AwaitingReview);
            }
        }

        if effect.overall_became_approved() {
            for id in finance_ids {
                fanout.add(*id, NotificationMessage::ReadyForPayment);
            }
        }

        fanout
    }

    /// Conclusão financeira: avisa o solicitante.
    pub fn on_received(request: &Request) -> Self {
        let mut fanout = Self::new(request);
        fanout.add(request.requester_id, NotificationMessage::Received);
        fanout
    }
}

// =============================================================================
//  ENTREGA
// =============================================================================

/// Resultado observável de uma entrega (nunca vira erro para quem disparou).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub persisted: usize,
    pub pushed: usize,
    pub failures: usize,
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn RealtimeTransport>,
    ttl: Duration,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn RealtimeTransport>,
        ttl: Duration,
    ) -> Self {
        Self { store, transport, ttl }
    }

    /// Dispara a entrega numa task e devolve o handle para quem chamou aguardar.
    ///
    /// Ordem: linhas duráveis primeiro, depois o push por usuário, por fim o sinal global.
    pub fn notify(&self, fanout: Fanout) -> JoinHandle<FanoutReport> {
        let store = self.store.clone();
        let transport = self.transport.clone();
        let ttl = self.ttl;

        tokio::spawn(async move {
            let mut report = FanoutReport::default();
            let Fanout { tenant_id, request_id, deliveries } = fanout;
            if deliveries.is_empty() {
                return report;
            }

            // 1. Linhas duráveis (fonte de verdade)
            let now = Utc::now();
            let rows: Vec<Notification> = deliveries
                .iter()
                .map(|(user_id, message)| {
                    Notification::new(tenant_id, request_id, *user_id, message.text(request_id), now, ttl)
                })
                .collect();

            match store.insert_many(tenant_id, &rows).await {
                Ok(()) => report.persisted = rows.len(),
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(%tenant_id, %request_id, error = %e, "falha ao gravar notificações");
                }
            }

            // 2. Push por usuário (melhor esforço)
            let payload = json!({ "requestId": request_id });
            for (user_id, _) in &deliveries {
                for event in [EVENT_NOTIFICATIONS_CHANGED, EVENT_REQUESTS_CHANGED] {
                    match transport.push_to_user_group(*user_id, event, payload.clone()).await {
                        Ok(()) => report.pushed += 1,
                        Err(e) => {
                            report.failures += 1;
                            tracing::warn!(%tenant_id, %request_id, user_id = *user_id, event, error = %e, "falha no push");
                        }
                    }
                }
            }

            // 3. Sinal global de recarga
            match transport.push_to_all(tenant_id, EVENT_REQUESTS_CHANGED, payload).await {
                Ok(()) => report.pushed += 1,
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(%tenant_id, %request_id, error = %e, "falha no push global");
                }
            }

            report
        })
    }

    pub async fn list_for(&self, caller: &CallerContext) -> Result<Vec<Notification>, AppError> {
        self.store.list_active(caller.tenant_id, caller.user_id, Utc::now()).await
    }

    /// Marca como lida. Só o dono consegue; para os demais a notificação "não existe".
    pub async fn mark_opened(&self, caller: &CallerContext, id: Uuid) -> Result<(), AppError> {
        let updated = self.store.mark_opened(caller.tenant_id, caller.user_id, id).await?;
        if !updated {
            return Err(AppError::NotificationNotFound(id));
        }

        if let Err(e) = self
            .transport
            .push_to_user_group(caller.user_id, EVENT_NOTIFICATIONS_CHANGED, json!({ "notificationId": id }))
            .await
        {
            tracing::warn!(user_id = caller.user_id, notification_id = %id, error = %e, "falha no push");
        }
        Ok(())
    }
}
