// src/models/tenancy.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "plan_tier", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Free,
    Standard,
    Enterprise,
}

// ---
// Tenant (A "Empresa cliente")
// ---
// Fronteira de isolamento: toda solicitação, empresa e usuário pertence a exatamente um.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: Uuid,
    #[schema(example = "Polacchini Engenharia")]
    pub name: String,
    pub plan: PlanTier,

    // Uso corrente
    #[schema(example = 12)]
    pub current_month_requests: i32,
    #[schema(example = 8)]
    pub current_users: i32,

    // Limites do plano
    #[schema(example = 100)]
    pub max_requests_per_month: i32,
    #[schema(example = 10)]
    pub max_users: i32,

    pub is_active: bool,
    pub usage_reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn remaining_requests(&self) -> i32 {
        (self.max_requests_per_month - self.current_month_requests).max(0)
    }
}
