// src/handlers/requests.rs

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        i18n::Locale,
        rbac::{FinanceOnly, RequireRole},
    },
    models::{
        approval::{Level, Vote},
        auth::{CallerContext, UserId},
        company::CompanyId,
        request::RequestView,
    },
    services::request_service::{ListFilter, Registration},
};

// =============================================================================
//  REGISTRO
// =============================================================================

// Parte "data" do multipart. O solicitante vem da sessão, nunca daqui.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequestPayload {
    #[schema(example = 3)]
    pub company_id: CompanyId,

    #[validate(range(min = 1, message = "O valor deve ser positivo"))]
    #[schema(example = 15990)]
    pub amount: i64,

    #[schema(value_type = String, format = Date, example = "2026-11-30")]
    pub payment_date: NaiveDate,

    #[validate(length(max = 500, message = "A observação deve ter no máximo 500 caracteres"))]
    pub note: Option<String>,

    #[validate(length(min = 1, message = "Informe ao menos um gestor"))]
    #[schema(example = json!([5, 9]))]
    pub manager_ids: Vec<UserId>,

    #[serde(default)]
    #[schema(example = json!([3]))]
    pub director_ids: Vec<UserId>,
}

fn bad_multipart(e: impl std::fmt::Display) -> AppError {
    AppError::InvalidInput(format!("multipart inválido: {}", e))
}

// Lê as partes "data" (JSON), "invoice" e "budget" (arquivos, opcionais)
async fn read_registration(mut multipart: Multipart) -> Result<Registration, AppError> {
    let mut payload: Option<RegisterRequestPayload> = None;
    let mut invoice = None;
    let mut budget = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "data" => {
                let raw = field.bytes().await.map_err(bad_multipart)?;
                let parsed = serde_json::from_slice::<RegisterRequestPayload>(&raw)
                    .map_err(|e| AppError::InvalidInput(format!("campo data: {}", e)))?;
                payload = Some(parsed);
            }
            "invoice" => invoice = Some(field.bytes().await.map_err(bad_multipart)?.to_vec()),
            "budget" => budget = Some(field.bytes().await.map_err(bad_multipart)?.to_vec()),
            other => tracing::debug!(field = other, "parte multipart ignorada"),
        }
    }

    let payload = payload.ok_or_else(|| AppError::InvalidInput("campo data ausente".into()))?;
    payload.validate()?;

    // Arquivo vazio conta como ausente
    let non_empty = |bytes: Option<Vec<u8>>| bytes.filter(|b| !b.is_empty());

    Ok(Registration {
        company_id: payload.company_id,
        amount: payload.amount,
        payment_date: payload.payment_date,
        note: payload.note.filter(|n| !n.trim().is_empty()),
        manager_ids: payload.manager_ids,
        director_ids: payload.director_ids,
        invoice: non_empty(invoice),
        budget: non_empty(budget),
    })
}

// POST /api/requests
#[utoipa::path(
    post,
    path = "/api/requests",
    tag = "Requests",
    request_body(
        content = RegisterRequestPayload,
        content_type = "multipart/form-data",
        description = "Parte `data` (JSON) + arquivos opcionais `invoice` e `budget`"
    ),
    responses(
        (status = 201, description = "Solicitação registrada", body = RequestView),
        (status = 400, description = "Dados inválidos"),
        (status = 403, description = "Limite mensal do plano atingido"),
        (status = 404, description = "Empresa não encontrada")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_request(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let registration = read_registration(multipart)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    let cancel = app_state.shutdown.child_token();
    let view = app_state
        .request_service
        .register(&caller, registration, &cancel)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(view)))
}

// =============================================================================
//  VOTO E CONCLUSÃO
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CastVotePayload {
    pub level: Level,
    /// -1 reprova, 0 volta para pendente, 1 aprova
    #[schema(value_type = i16, example = 1)]
    pub vote: Vote,
}

// POST /api/requests/{id}/votes
#[utoipa::path(
    post,
    path = "/api/requests/{id}/votes",
    tag = "Requests",
    request_body = CastVotePayload,
    params(("id" = Uuid, Path, description = "ID da solicitação")),
    responses(
        (status = 200, description = "Voto registrado", body = RequestView),
        (status = 403, description = "Papel não vota neste nível"),
        (status = 404, description = "Solicitação ou aprovador não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn cast_vote(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<CastVotePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let cancel = app_state.shutdown.child_token();
    let view = app_state
        .request_service
        .cast_vote(&caller, request_id, payload.level, payload.vote, &cancel)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(view)))
}

// POST /api/requests/{id}/receive
#[utoipa::path(
    post,
    path = "/api/requests/{id}/receive",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "ID da solicitação")),
    responses(
        (status = 200, description = "Solicitação finalizada", body = RequestView),
        (status = 403, description = "Apenas o financeiro"),
        (status = 409, description = "Já finalizada"),
        (status = 422, description = "Ainda não aprovada")
    ),
    security(("api_jwt" = []))
)]
pub async fn mark_received(
    State(app_state): State<AppState>,
    locale: Locale,
    guard: RequireRole<FinanceOnly>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let cancel = app_state.shutdown.child_token();
    let view = app_state
        .request_service
        .mark_received(guard.caller(), request_id, &cancel)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(view)))
}

// =============================================================================
//  LEITURA
// =============================================================================

// GET /api/requests/{id}
#[utoipa::path(
    get,
    path = "/api/requests/{id}",
    tag = "Requests",
    params(("id" = Uuid, Path, description = "ID da solicitação")),
    responses(
        (status = 200, description = "Solicitação", body = RequestView),
        (status = 404, description = "Não encontrada (ou fora da sua visibilidade)")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_request(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = app_state
        .request_service
        .get(&caller, request_id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(view)))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListRequestsQuery {
    /// Etapas separadas por vírgula: -1 reprovada, 1 gestores, 2 diretores, 3 financeiro, 4 finalizada
    #[param(example = "1,2")]
    pub levels: Option<String>,
    /// IDs separados por vírgula (só restringe o resultado)
    pub ids: Option<String>,
    /// Padrão 100, máximo 500
    pub limit: Option<i64>,
}

fn split_list<T>(raw: Option<&str>, what: &str) -> Result<Option<Vec<T>>, AppError>
where
    T: std::str::FromStr,
{
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<T>()
                .map_err(|_| AppError::InvalidInput(format!("{} inválido: {}", what, part.trim())))
        })
        .collect::<Result<Vec<T>, AppError>>()
        .map(Some)
}

impl ListRequestsQuery {
    fn into_filter(self) -> Result<ListFilter, AppError> {
        Ok(ListFilter {
            levels: split_list::<i16>(self.levels.as_deref(), "nível")?,
            ids: split_list::<Uuid>(self.ids.as_deref(), "id")?,
            limit: self.limit,
        })
    }
}

// GET /api/requests
#[utoipa::path(
    get,
    path = "/api/requests",
    tag = "Requests",
    params(ListRequestsQuery),
    responses(
        (status = 200, description = "Solicitações visíveis, mais recentes primeiro", body = Vec<RequestView>),
        (status = 400, description = "Filtro inválido")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_requests(
    State(app_state): State<AppState>,
    locale: Locale,
    caller: CallerContext,
    Query(query): Query<ListRequestsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.into_filter().map_err(|e| e.to_api_error(&locale))?;

    let views = app_state
        .request_service
        .list(&caller, &filter)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::OK, Json(views)))
}
