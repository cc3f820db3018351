use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::i18n::Locale;
use crate::models::{auth::UserId, company::CompanyId};

// Erros de negócio (Pending/Approved/Rejected) NÃO passam por aqui: são valores.
// Só problemas estruturais viram AppError.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Dados inválidos: {0}")]
    InvalidInput(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Sessão sem tenant resolvível")]
    Unauthorized,

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Solicitação {0} não encontrada")]
    RequestNotFound(Uuid),

    #[error("Empresa {0} não encontrada")]
    CompanyNotFound(CompanyId),

    #[error("Aprovador {approver_id} não está vinculado à solicitação {request_id}")]
    ApproverNotFound { request_id: Uuid, approver_id: UserId },

    #[error("Notificação {0} não encontrada")]
    NotificationNotFound(Uuid),

    #[error("Conflito: {0}")]
    Conflict(String),

    #[error("Limite mensal de solicitações do plano atingido")]
    QuotaExceeded,

    #[error("Solicitação {0} ainda não foi aprovada")]
    RequestNotApproved(Uuid),

    #[error("Operação cancelada")]
    Cancelled,

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

// O corpo de erro que sai na API
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self { status, error: error.into(), details: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidToken | AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::QuotaExceeded => StatusCode::FORBIDDEN,
            AppError::RequestNotFound(_)
            | AppError::CompanyNotFound(_)
            | AppError::ApproverNotFound { .. }
            | AppError::NotificationNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RequestNotApproved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            AppError::DatabaseError(_)
            | AppError::InternalServerError(_)
            | AppError::JwtError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Converte para a resposta da API, com a mensagem no idioma do cliente.
    pub fn to_api_error(self, locale: &Locale) -> ApiError {
        let status = self.status();
        let en = locale.is_english();

        let error = match &self {
            AppError::ValidationError(errors) => {
                // Retorna todos os detalhes da validação, campo a campo
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let error = if en { "One or more fields are invalid." } else { "Um ou mais campos são inválidos." };
                return ApiError { status, error: error.into(), details: Some(json!(details)) };
            }
            AppError::InvalidInput(msg) => msg.clone(),
            AppError::InvalidToken => tr(en, "Invalid or missing authentication token.", "Token de autenticação inválido ou ausente."),
            AppError::Unauthorized => tr(en, "Session is not bound to a tenant.", "Sessão não vinculada a nenhuma empresa."),
            AppError::Forbidden(reason) => reason.clone(),
            AppError::RequestNotFound(_) => tr(en, "Request not found.", "Solicitação não encontrada."),
            AppError::CompanyNotFound(_) => tr(en, "Company not found.", "Empresa não encontrada."),
            AppError::ApproverNotFound { .. } => tr(en, "You are not an approver of this request at this level.", "Você não é aprovador desta solicitação neste nível."),
            AppError::NotificationNotFound(_) => tr(en, "Notification not found.", "Notificação não encontrada."),
            AppError::Conflict(msg) => msg.clone(),
            AppError::QuotaExceeded => tr(en, "Monthly request limit of your plan reached.", "Limite mensal de solicitações do plano atingido."),
            AppError::RequestNotApproved(_) => tr(en, "Request has not been approved yet.", "A solicitação ainda não foi aprovada."),
            AppError::Cancelled => tr(en, "Operation cancelled.", "Operação cancelada."),

            // Todos os outros erros viram 500. O `tracing` loga a mensagem detalhada.
            e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                tr(en, "An unexpected error occurred.", "Ocorreu um erro inesperado.")
            }
        };

        ApiError { status, error, details: None }
    }
}

fn tr(en: bool, english: &str, portuguese: &str) -> String {
    if en { english.to_string() } else { portuguese.to_string() }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}
