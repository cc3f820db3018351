// src/models/request.rs

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        approval::{aggregate_level, combine_overall, Level, Outcome, Vote},
        auth::{CallerContext, Role, UserId, UserSummary},
        company::{CompanyId, CompanySummary},
    },
};

// =============================================================================
//  ANEXOS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum AttachmentKind {
    Invoice,
    Budget,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AttachmentKind::Invoice => "invoice",
            AttachmentKind::Budget => "budget",
        }
    }
}

// Identificador gerado na criação + se o arquivo foi de fato gravado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentHandle {
    pub id: Uuid,
    pub present: bool,
}

impl AttachmentHandle {
    fn allocate() -> Self {
        Self { id: Uuid::new_v4(), present: false }
    }
}

// =============================================================================
//  ARESTAS DE APROVAÇÃO
// =============================================================================

// Chave composta (request_id, approver_id). Só o voto muda depois de criada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproverEdge {
    pub request_id: Uuid,
    pub approver_id: UserId,
    pub vote: Vote,
}

// =============================================================================
//  A SOLICITAÇÃO (AGREGADO)
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: CompanyId,
    pub requester_id: UserId,
    pub finisher_id: Option<UserId>,

    pub invoice: AttachmentHandle,
    pub budget: AttachmentHandle,

    pub amount: i64, // centavos
    pub note: Option<String>,

    pub payment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub first_level_at: Option<DateTime<Utc>>,
    pub second_level_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub managers: Vec<ApproverEdge>,
    pub directors: Vec<ApproverEdge>,
}

// Dados de entrada já resolvidos (o solicitante vem da sessão)
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub tenant_id: Uuid,
    pub requester_id: UserId,
    pub company_id: CompanyId,
    pub amount: i64,
    pub payment_date: NaiveDate,
    pub note: Option<String>,
    pub manager_ids: Vec<UserId>,
    pub director_ids: Vec<UserId>,
}

// Resultado derivado das arestas. Nunca é gravado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcomes {
    pub first: Outcome,
    pub second: Outcome,
    pub overall: Outcome,
}

// Efeito de um voto: estados antes/depois e o carimbo gravado, se houve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteEffect {
    pub level: Level,
    pub before: Outcomes,
    pub after: Outcomes,
    pub stamped_at: Option<DateTime<Utc>>,
}

impl VoteEffect {
    pub fn first_changed(&self) -> bool {
        self.before.first != self.after.first
    }

    pub fn second_changed(&self) -> bool {
        self.before.second != self.after.second
    }

    pub fn level_changed(&self) -> bool {
        self.first_changed() || self.second_changed()
    }

    pub fn overall_became_approved(&self) -> bool {
        self.before.overall != Outcome::Approved && self.after.overall == Outcome::Approved
    }
}

fn edges(request_id: Uuid, ids: &[UserId]) -> Vec<ApproverEdge> {
    // A chave composta não admite o mesmo aprovador duas vezes
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert(**id))
        .map(|&approver_id| ApproverEdge { request_id, approver_id, vote: Vote::Pending })
        .collect()
}

impl Request {
    /// Monta uma nova solicitação com todas as arestas pendentes.
    ///
    /// Uma lista de gestores vazia é aceita aqui: o primeiro nível ficará pendente para sempre.
    pub fn create(input: NewRequest, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            tenant_id: input.tenant_id,
            company_id: input.company_id,
            requester_id: input.requester_id,
            finisher_id: None,
            invoice: AttachmentHandle::allocate(),
            budget: AttachmentHandle::allocate(),
            amount: input.amount,
            note: input.note,
            payment_date: input.payment_date,
            created_at: now,
            first_level_at: None,
            second_level_at: None,
            finished_at: None,
            managers: edges(id, &input.manager_ids),
            directors: edges(id, &input.director_ids),
        }
    }

    pub fn has_second_level(&self) -> bool {
        !self.directors.is_empty()
    }

    pub fn edges_at(&self, level: Level) -> &[ApproverEdge] {
        match level {
            Level::Manager => &self.managers,
            Level::Director => &self.directors,
        }
    }

    pub fn attachment(&self, kind: AttachmentKind) -> AttachmentHandle {
        match kind {
            AttachmentKind::Invoice => self.invoice,
            AttachmentKind::Budget => self.budget,
        }
    }

    pub fn mark_attachment_present(&mut self, kind: AttachmentKind) {
        match kind {
            AttachmentKind::Invoice => self.invoice.present = true,
            AttachmentKind::Budget => self.budget.present = true,
        }
    }

    /// Recalcula os resultados a partir das arestas (a cada leitura).
    pub fn outcomes(&self) -> Outcomes {
        let first = aggregate_level(self.managers.iter().map(|e| e.vote));
        let second = aggregate_level(self.directors.iter().map(|e| e.vote));
        Outcomes {
            first,
            second,
            overall: combine_overall(first, second, self.has_second_level()),
        }
    }

    pub fn stage(&self) -> RequestStage {
        RequestStage::derive(&self.outcomes(), self.finished_at.is_some())
    }

    pub fn is_approver(&self, user_id: UserId) -> bool {
        self.managers.iter().chain(&self.directors).any(|e| e.approver_id == user_id)
    }

    /// Registra o voto de um aprovador no nível indicado.
    ///
    /// O carimbo de conclusão do nível é gravado uma única vez, na primeira saída de `Pending`,
    /// e nunca é apagado por votos posteriores.
    pub fn cast_vote(
        &mut self,
        approver_id: UserId,
        level: Level,
        vote: Vote,
        now: DateTime<Utc>,
    ) -> Result<VoteEffect, AppError> {
        let before = self.outcomes();

        let request_id = self.id;
        let edges = match level {
            Level::Manager => &mut self.managers,
            Level::Director => &mut self.directors,
        };
        let edge = edges
            .iter_mut()
            .find(|e| e.request_id == request_id && e.approver_id == approver_id)
            .ok_or(AppError::ApproverNotFound { request_id, approver_id })?;
        edge.vote = vote;

        let after = self.outcomes();
        let level_outcome = match level {
            Level::Manager => after.first,
            Level::Director => after.second,
        };
        let stamp = match level {
            Level::Manager => &mut self.first_level_at,
            Level::Director => &mut self.second_level_at,
        };

        let mut stamped_at = None;
        if level_outcome != Outcome::Pending && stamp.is_none() {
            *stamp = Some(now);
            stamped_at = Some(now);
        }

        Ok(VoteEffect { level, before, after, stamped_at })
    }

    /// Conclusão financeira: só para solicitações aprovadas e ainda não finalizadas.
    pub fn mark_received(&mut self, finisher_id: UserId, now: DateTime<Utc>) -> Result<(), AppError> {
        if self.finished_at.is_some() {
            return Err(AppError::Conflict(format!("Solicitação {} já foi finalizada", self.id)));
        }
        if self.outcomes().overall != Outcome::Approved {
            return Err(AppError::RequestNotApproved(self.id));
        }
        self.finisher_id = Some(finisher_id);
        self.finished_at = Some(now);
        Ok(())
    }

    /// Todos os usuários citados pela solicitação (para buscar os resumos de uma vez).
    pub fn user_ids(&self) -> BTreeSet<UserId> {
        let mut ids: BTreeSet<UserId> = self
            .managers
            .iter()
            .chain(&self.directors)
            .map(|e| e.approver_id)
            .collect();
        ids.insert(self.requester_id);
        ids.extend(self.finisher_id);
        ids
    }

    /// Monta o modelo de leitura, recalculando os resultados agora.
    pub fn compute_view(&self, directory: &ViewDirectory) -> RequestView {
        let outcomes = self.outcomes();
        let approvers = |edges: &[ApproverEdge], role: Role| -> Vec<ApproverView> {
            edges
                .iter()
                .map(|e| ApproverView {
                    approver: directory.user(e.approver_id, role),
                    vote: e.vote,
                })
                .collect()
        };

        RequestView {
            id: self.id,
            requester: directory.user(self.requester_id, Role::Requester),
            company: directory.company(self.company_id),
            finisher: self.finisher_id.map(|id| directory.user(id, Role::Finance)),
            amount: self.amount,
            note: self.note.clone(),
            payment_date: self.payment_date,
            created_at: self.created_at,
            first_level_at: self.first_level_at,
            second_level_at: self.second_level_at,
            finished_at: self.finished_at,
            first_level: outcomes.first,
            second_level: outcomes.second,
            overall: outcomes.overall,
            overall_label: outcomes.overall.label().to_string(),
            stage: RequestStage::derive(&outcomes, self.finished_at.is_some()),
            has_invoice: self.invoice.present,
            has_budget: self.budget.present,
            managers: approvers(&self.managers, Role::Manager),
            directors: approvers(&self.directors, Role::Director),
        }
    }
}

// =============================================================================
//  ETAPA (FILTRO DAS TELAS DE LISTAGEM)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum RequestStage {
    Rejected,
    AwaitingManagers,
    AwaitingDirectors,
    AwaitingFinance,
    Received,
}

impl RequestStage {
    pub fn derive(outcomes: &Outcomes, finished: bool) -> Self {
        if outcomes.overall == Outcome::Rejected {
            RequestStage::Rejected
        } else if finished {
            RequestStage::Received
        } else if outcomes.overall == Outcome::Approved {
            RequestStage::AwaitingFinance
        } else if outcomes.first == Outcome::Approved {
            RequestStage::AwaitingDirectors
        } else {
            RequestStage::AwaitingManagers
        }
    }
}

impl From<RequestStage> for i16 {
    fn from(stage: RequestStage) -> Self {
        match stage {
            RequestStage::Rejected => -1,
            RequestStage::AwaitingManagers => 1,
            RequestStage::AwaitingDirectors => 2,
            RequestStage::AwaitingFinance => 3,
            RequestStage::Received => 4,
        }
    }
}

impl TryFrom<i16> for RequestStage {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(RequestStage::Rejected),
            1 => Ok(RequestStage::AwaitingManagers),
            2 => Ok(RequestStage::AwaitingDirectors),
            3 => Ok(RequestStage::AwaitingFinance),
            4 => Ok(RequestStage::Received),
            other => Err(format!("etapa inválida: {}", other)),
        }
    }
}

// =============================================================================
//  VISIBILIDADE (QUEM ENXERGA O QUÊ)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    // Financeiro e assistentes: todo o tenant
    WholeTenant,
    // Gestores e diretores: o que pediram + onde são aprovadores
    Involved(UserId),
    // Solicitantes: só o que pediram
    Own(UserId),
}

impl Visibility {
    pub fn for_caller(caller: &CallerContext) -> Self {
        match caller.role {
            role if role.sees_whole_tenant() => Visibility::WholeTenant,
            Role::Manager | Role::Director => Visibility::Involved(caller.user_id),
            _ => Visibility::Own(caller.user_id),
        }
    }

    pub fn allows(&self, request: &Request) -> bool {
        match *self {
            Visibility::WholeTenant => true,
            Visibility::Involved(user_id) => {
                request.requester_id == user_id || request.is_approver(user_id)
            }
            Visibility::Own(user_id) => request.requester_id == user_id,
        }
    }
}

// O que a listagem pede ao repositório (o tenant vai à parte, sempre)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestScope {
    pub visibility: Visibility,
    pub ids: Option<Vec<Uuid>>,
    pub stages: Option<Vec<RequestStage>>,
    pub limit: Option<i64>,
}

impl RequestScope {
    pub fn matches_stage(&self, request: &Request) -> bool {
        self.stages.as_ref().is_none_or(|s| s.contains(&request.stage()))
    }
}

// =============================================================================
//  VIEW (O QUE SAI NA API)
// =============================================================================

// Resumos de usuários e empresas já carregados do diretório
#[derive(Debug, Clone, Default)]
pub struct ViewDirectory {
    pub users: HashMap<UserId, UserSummary>,
    pub companies: HashMap<CompanyId, CompanySummary>,
}

impl ViewDirectory {
    pub fn new(users: Vec<UserSummary>, companies: Vec<CompanySummary>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
            companies: companies.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    fn user(&self, id: UserId, role: Role) -> UserSummary {
        self.users
            .get(&id)
            .cloned()
            .unwrap_or_else(|| UserSummary::unknown(id, role))
    }

    fn company(&self, id: CompanyId) -> CompanySummary {
        self.companies.get(&id).cloned().unwrap_or_else(|| CompanySummary {
            id,
            name: format!("Empresa #{}", id),
            tax_id: String::new(),
            is_enabled: false,
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproverView {
    pub approver: UserSummary,
    #[schema(value_type = i16, example = 0)]
    pub vote: Vote,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: Uuid,
    pub requester: UserSummary,
    pub company: CompanySummary,
    pub finisher: Option<UserSummary>,

    #[schema(example = 15990)]
    pub amount: i64,
    #[schema(example = "Passagens para a visita técnica")]
    pub note: Option<String>,

    #[schema(value_type = String, format = Date, example = "2026-11-30")]
    pub payment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub first_level_at: Option<DateTime<Utc>>,
    pub second_level_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    pub first_level: Outcome,
    pub second_level: Outcome,
    pub overall: Outcome,
    #[schema(example = "Pending")]
    pub overall_label: String,
    #[schema(value_type = i16, example = 1)]
    pub stage: RequestStage,

    pub has_invoice: bool,
    pub has_budget: bool,

    pub managers: Vec<ApproverView>,
    pub directors: Vec<ApproverView>,
}
