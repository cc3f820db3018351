// src/models/notification.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{
    approval::{Level, Outcome},
    auth::UserId,
};

// Nomes dos eventos de tempo real
pub const EVENT_REQUESTS_CHANGED: &str = "requests-changed";
pub const EVENT_NOTIFICATIONS_CHANGED: &str = "notifications-changed";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub request_id: Uuid,
    pub user_id: UserId,
    #[schema(example = "Nova solicitação de reembolso aguardando sua avaliação.")]
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_opened: bool,
}

impl Notification {
    pub fn new(
        tenant_id: Uuid,
        request_id: Uuid,
        user_id: UserId,
        message: String,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            request_id,
            user_id,
            message,
            created_at: now,
            expires_at: now + ttl,
            is_opened: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---
// O que aconteceu com a solicitação (vira o texto da notificação)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMessage {
    Created,
    AwaitingReview,
    LevelDecided { level: Level, outcome: Outcome },
    ReadyForPayment,
    Received,
}

impl NotificationMessage {
    pub fn text(&self, request_id: Uuid) -> String {
        let code = short_code(request_id);
        match self {
            NotificationMessage::Created => {
                format!("Solicitação {} registrada.", code)
            }
            NotificationMessage::AwaitingReview => {
                format!("Solicitação {} aguardando sua avaliação.", code)
            }
            NotificationMessage::LevelDecided { level, outcome } => {
                let who = match level {
                    Level::Manager => "pelos gestores",
                    Level::Director => "pela diretoria",
                };
                let what = match outcome {
                    Outcome::Approved => "aprovada",
                    Outcome::Rejected => "reprovada",
                    Outcome::Pending => "reaberta",
                };
                format!("Solicitação {} {} {}.", code, what, who)
            }
            NotificationMessage::ReadyForPayment => {
                format!("Solicitação {} aprovada e liberada para pagamento.", code)
            }
            NotificationMessage::Received => {
                format!("Solicitação {} finalizada pelo financeiro.", code)
            }
        }
    }
}

// Os 8 primeiros caracteres do UUID bastam para o usuário reconhecer a solicitação
fn short_code(request_id: Uuid) -> String {
    let simple = request_id.simple().to_string();
    format!("#{}", &simple[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_ttl() {
        let now = Utc::now();
        let n = Notification::new(Uuid::new_v4(), Uuid::new_v4(), 7, "x".into(), now, Duration::days(30));
        assert!(!n.is_expired(now + Duration::days(29)));
        assert!(n.is_expired(now + Duration::days(30)));
    }

    #[test]
    fn message_mentions_short_code() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        let text = NotificationMessage::AwaitingReview.text(id);
        assert!(text.contains("#a1b2c3d4"), "{}", text);
    }
}
