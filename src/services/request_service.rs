// src/services/request_service.rs

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{directory::DirectoryStore, request_repo::RequestStore},
    middleware::rbac::{check_role, FinanceOnly},
    models::{
        approval::{Level, Vote},
        auth::{CallerContext, Role, User, UserId, UserSummary},
        company::CompanyId,
        request::{
            AttachmentKind, NewRequest, Request, RequestScope, RequestStage, RequestView,
            ViewDirectory, Visibility,
        },
    },
    services::{
        attachment_service::AttachmentSink,
        notification_service::{Fanout, FanoutReport, NotificationService},
    },
};

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 500;

// Comando de registro. O solicitante e o tenant vêm do CallerContext, nunca daqui.
#[derive(Debug, Clone)]
pub struct Registration {
    pub company_id: CompanyId,
    pub amount: i64,
    pub payment_date: NaiveDate,
    pub note: Option<String>,
    pub manager_ids: Vec<UserId>,
    pub director_ids: Vec<UserId>,
    pub invoice: Option<Vec<u8>>,
    pub budget: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub levels: Option<Vec<i16>>,
    pub ids: Option<Vec<Uuid>>,
    pub limit: Option<i64>,
}

impl ListFilter {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
    }

    fn stages(&self) -> Result<Option<Vec<RequestStage>>, AppError> {
        self.levels
            .as_ref()
            .map(|codes| {
                codes
                    .iter()
                    .map(|code| RequestStage::try_from(*code).map_err(AppError::InvalidInput))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
    }
}

// Corre o futuro até o fim, a menos que o token seja cancelado antes.
// Futuro abandonado = transação descartada (rollback).
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

#[derive(Clone)]
pub struct RequestService {
    requests: Arc<dyn RequestStore>,
    directory: Arc<dyn DirectoryStore>,
    attachments: Arc<dyn AttachmentSink>,
    notifications: NotificationService,
    side_effect_timeout: Duration,
}

impl RequestService {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        directory: Arc<dyn DirectoryStore>,
        attachments: Arc<dyn AttachmentSink>,
        notifications: NotificationService,
        side_effect_timeout: Duration,
    ) -> Self {
        Self { requests, directory, attachments, notifications, side_effect_timeout }
    }

    // =========================================================================
    //  REGISTRO
    // =========================================================================

    /// Registra uma solicitação.
    ///
    /// Depois do commit o resultado é sempre sucesso: falha de anexo ou de aviso
    /// só aparece nos logs.
    pub async fn register(
        &self,
        caller: &CallerContext,
        command: Registration,
        cancel: &CancellationToken,
    ) -> Result<RequestView, AppError> {
        let tenant_id = caller.tenant_id;

        // 1. Empresa e aprovadores precisam existir neste tenant
        cancellable(cancel, self.validate_registration(tenant_id, &command)).await?;

        // 2. Monta o agregado
        let Registration {
            company_id,
            amount,
            payment_date,
            note,
            manager_ids,
            director_ids,
            invoice,
            budget,
        } = command;

        let mut request = Request::create(
            NewRequest {
                tenant_id,
                requester_id: caller.user_id,
                company_id,
                amount,
                payment_date,
                note,
                manager_ids,
                director_ids,
            },
            Utc::now(),
        );

        // 3. Persiste (ponto de commit). Daqui em diante o cancelamento é ignorado.
        cancellable(cancel, self.requests.insert(&request)).await?;
        tracing::info!(request_id = %request.id, %tenant_id, requester_id = caller.user_id, "solicitação registrada");

        // 4. Efeitos colaterais em paralelo: anexos + avisos
        let mut uploads = Vec::new();
        for (kind, bytes) in [(AttachmentKind::Invoice, invoice), (AttachmentKind::Budget, budget)] {
            if let Some(bytes) = bytes {
                uploads.push((kind, self.spawn_attachment_write(&request, kind, bytes)));
            }
        }
        let fanout = self.notifications.notify(Fanout::on_created(&request));

        for (kind, handle) in uploads {
            match self.await_side_effect(handle).await {
                Some(Ok(())) => request.mark_attachment_present(kind),
                Some(Err(e)) => {
                    tracing::warn!(request_id = %request.id, %tenant_id, kind = kind.as_str(), error = %e, "falha ao gravar anexo")
                }
                None => {
                    tracing::warn!(request_id = %request.id, %tenant_id, kind = kind.as_str(), "anexo não concluído a tempo")
                }
            }
        }
        self.finish_fanout(&request, fanout).await;

        // 5. View
        let directory = match self.load_directory(tenant_id, std::slice::from_ref(&request)).await {
            Ok(directory) => directory,
            Err(e) => {
                tracing::warn!(request_id = %request.id, error = %e, "diretório indisponível para a view");
                ViewDirectory::default()
            }
        };
        Ok(request.compute_view(&directory))
    }

    async fn validate_registration(&self, tenant_id: Uuid, command: &Registration) -> Result<(), AppError> {
        let company = self.directory.company(tenant_id, command.company_id).await?;
        match company {
            Some(company) if company.is_enabled => {}
            _ => return Err(AppError::CompanyNotFound(command.company_id)),
        }

        let ids: BTreeSet<UserId> = command
            .manager_ids
            .iter()
            .chain(&command.director_ids)
            .copied()
            .collect();
        let ids: Vec<UserId> = ids.into_iter().collect();
        let users: HashMap<UserId, User> = self
            .directory
            .users(tenant_id, &ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut invalid = Vec::new();
        for (level, level_ids) in [(Level::Manager, &command.manager_ids), (Level::Director, &command.director_ids)] {
            let role = Role::for_level(level);
            for id in level_ids {
                let ok = users
                    .get(id)
                    .map(|u| u.is_enabled && u.role == role && u.tenant_id == tenant_id)
                    .unwrap_or(false);
                if !ok {
                    invalid.push(format!("{:?} {}", level, id));
                }
            }
        }

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(AppError::InvalidInput(format!("aprovadores inválidos: {}", invalid.join(", "))))
        }
    }

    fn spawn_attachment_write(
        &self,
        request: &Request,
        kind: AttachmentKind,
        bytes: Vec<u8>,
    ) -> JoinHandle<Result<(), AppError>> {
        let sink = self.attachments.clone();
        let store = self.requests.clone();
        let tenant_id = request.tenant_id;
        let request_id = request.id;
        let attachment_id = request.attachment(kind).id;

        tokio::spawn(async move {
            sink.write_attachment(tenant_id, attachment_id, kind, bytes).await?;
            store.set_attachment_present(tenant_id, request_id, kind).await
        })
    }

    // None = estourou o tempo ou a task morreu.
    // No estouro a task é abortada e aguardada: nada continua rodando depois da resposta.
    async fn await_side_effect<T>(&self, mut handle: JoinHandle<T>) -> Option<T> {
        match tokio::time::timeout(self.side_effect_timeout, &mut handle).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(join_error)) => {
                tracing::warn!(error = %join_error, "task de efeito colateral falhou");
                None
            }
            Err(_) => {
                handle.abort();
                match handle.await {
                    // Terminou entre o estouro e o abort
                    Ok(value) => Some(value),
                    Err(join_error) if join_error.is_cancelled() => {
                        tracing::warn!(timeout_ms = self.side_effect_timeout.as_millis() as u64, "efeito colateral abortado por tempo");
                        None
                    }
                    Err(join_error) => {
                        tracing::warn!(error = %join_error, "task de efeito colateral falhou");
                        None
                    }
                }
            }
        }
    }

    async fn finish_fanout(&self, request: &Request, handle: JoinHandle<FanoutReport>) {
        match self.await_side_effect(handle).await {
            Some(report) if report.failures > 0 => {
                tracing::warn!(request_id = %request.id, tenant_id = %request.tenant_id, failures = report.failures, "entrega de avisos incompleta")
            }
            Some(report) => {
                tracing::debug!(request_id = %request.id, persisted = report.persisted, pushed = report.pushed, "avisos entregues")
            }
            None => {
                tracing::warn!(request_id = %request.id, tenant_id = %request.tenant_id, "entrega de avisos não concluída a tempo")
            }
        }
    }

    // =========================================================================
    //  VOTO
    // =========================================================================

    /// Voto do próprio chamador no nível indicado.
    pub async fn cast_vote(
        &self,
        caller: &CallerContext,
        request_id: Uuid,
        level: Level,
        vote: Vote,
        cancel: &CancellationToken,
    ) -> Result<RequestView, AppError> {
        if !caller.role.can_vote_at(level) {
            return Err(AppError::Forbidden(format!("o papel {:?} não vota no nível {:?}", caller.role, level)));
        }

        let tenant_id = caller.tenant_id;

        // 1. Voto + carimbo numa transação com a solicitação travada (ponto de commit).
        //    A transição vem do estado gravado, não de uma leitura anterior.
        let (request, effect) = cancellable(
            cancel,
            self.requests.apply_vote(tenant_id, request_id, level, caller.user_id, vote, Utc::now()),
        )
        .await?;
        tracing::info!(%request_id, %tenant_id, approver_id = caller.user_id, ?level, vote = i16::from(vote), "voto registrado");

        // 2. Avisos (financeiro só é consultado se a solicitação acabou de ser aprovada)
        let finance_ids = if effect.overall_became_approved() {
            match self.directory.users_with_role(tenant_id, Role::Finance).await {
                Ok(users) => users.into_iter().map(|u| u.id).collect(),
                Err(e) => {
                    tracing::warn!(%request_id, error = %e, "não foi possível listar o financeiro");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };
        let fanout = Fanout::on_vote(&request, &effect, &finance_ids);
        if !fanout.is_empty() {
            let handle = self.notifications.notify(fanout);
            self.finish_fanout(&request, handle).await;
        }

        self.view_of(tenant_id, request).await
    }

    // =========================================================================
    //  CONCLUSÃO FINANCEIRA
    // =========================================================================

    pub async fn mark_received(
        &self,
        caller: &CallerContext,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<RequestView, AppError> {
        check_role::<FinanceOnly>(caller)?;

        let tenant_id = caller.tenant_id;
        let mut request = cancellable(cancel, self.requests.find(tenant_id, request_id))
            .await?
            .ok_or(AppError::RequestNotFound(request_id))?;

        let now = Utc::now();
        request.mark_received(caller.user_id, now)?;

        let updated = cancellable(cancel, self.requests.mark_received(tenant_id, request_id, caller.user_id, now)).await?;
        if !updated {
            // Outra chamada finalizou entre a leitura e a escrita
            return Err(AppError::Conflict(format!("Solicitação {} já foi finalizada", request_id)));
        }
        tracing::info!(%request_id, %tenant_id, finisher_id = caller.user_id, "solicitação finalizada");

        let handle = self.notifications.notify(Fanout::on_received(&request));
        self.finish_fanout(&request, handle).await;

        self.view_of(tenant_id, request).await
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn get(&self, caller: &CallerContext, request_id: Uuid) -> Result<RequestView, AppError> {
        let visibility = Visibility::for_caller(caller);
        let request = self
            .requests
            .find(caller.tenant_id, request_id)
            .await?
            .filter(|r| r.tenant_id == caller.tenant_id && visibility.allows(r))
            .ok_or(AppError::RequestNotFound(request_id))?;

        self.view_of(caller.tenant_id, request).await
    }

    /// Lista as solicitações visíveis ao chamador, mais recentes primeiro.
    ///
    /// `ids` só restringe: nunca devolve algo fora do tenant ou da visibilidade do papel.
    pub async fn list(&self, caller: &CallerContext, filter: &ListFilter) -> Result<Vec<RequestView>, AppError> {
        let stages = filter.stages()?;
        let limit = filter.effective_limit();
        let visibility = Visibility::for_caller(caller);

        // Etapa e corte vão para o banco; aqui só se confere de novo
        let scope = RequestScope {
            visibility,
            ids: filter.ids.clone(),
            stages,
            limit: Some(limit),
        };

        let requests: Vec<Request> = self
            .requests
            .list(caller.tenant_id, &scope)
            .await?
            .into_iter()
            .filter(|r| r.tenant_id == caller.tenant_id && visibility.allows(r) && scope.matches_stage(r))
            .take(limit as usize)
            .collect();

        let directory = self.load_directory(caller.tenant_id, &requests).await?;
        Ok(requests.iter().map(|r| r.compute_view(&directory)).collect())
    }

    /// Usuários ativos que podem ser escolhidos como aprovadores do nível.
    pub async fn approvers(&self, caller: &CallerContext, level: Level) -> Result<Vec<UserSummary>, AppError> {
        let users = self
            .directory
            .users_with_role(caller.tenant_id, Role::for_level(level))
            .await?;
        Ok(users.iter().map(User::summary).collect())
    }

    async fn view_of(&self, tenant_id: Uuid, request: Request) -> Result<RequestView, AppError> {
        let directory = self.load_directory(tenant_id, std::slice::from_ref(&request)).await?;
        Ok(request.compute_view(&directory))
    }

    // Carrega de uma vez os resumos de todos os usuários e empresas citados
    async fn load_directory(&self, tenant_id: Uuid, requests: &[Request]) -> Result<ViewDirectory, AppError> {
        if requests.is_empty() {
            return Ok(ViewDirectory::default());
        }

        let user_ids: BTreeSet<UserId> = requests.iter().flat_map(|r| r.user_ids()).collect();
        let company_ids: BTreeSet<CompanyId> = requests.iter().map(|r| r.company_id).collect();
        let user_ids: Vec<UserId> = user_ids.into_iter().collect();
        let company_ids: Vec<CompanyId> = company_ids.into_iter().collect();

        let users = self.directory.users(tenant_id, &user_ids).await?;
        let companies = self.directory.companies(tenant_id, &company_ids).await?;

        Ok(ViewDirectory::new(
            users.iter().map(User::summary).collect(),
            companies,
        ))
    }
}
