// src/models/company.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub type CompanyId = i32;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[validate(length(min = 8, max = 9, message = "CEP inválido"))]
    #[schema(example = "01310-100")]
    pub postal_code: String,
    #[validate(length(equal = 2, message = "Use a sigla do estado"))]
    #[schema(example = "SP")]
    pub state: String,
    #[validate(length(min = 1, message = "A cidade é obrigatória"))]
    #[schema(example = "São Paulo")]
    pub city: String,
    #[schema(example = "Bela Vista")]
    pub neighborhood: String,
    #[validate(length(min = 1, message = "A rua é obrigatória"))]
    #[schema(example = "Avenida Paulista")]
    pub street: String,
    #[schema(example = "1000")]
    pub number: String,
    pub complement: Option<String>,
}

// ---
// Company (A entidade faturada)
// ---
// Nunca é removida: é desativada, pois solicitações antigas continuam apontando para ela.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: CompanyId,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Polacchini Comércio LTDA")]
    pub name: String,
    #[schema(example = "12.345.678/0001-90")]
    pub tax_id: String,
    #[sqlx(flatten)]
    pub address: Address,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub id: CompanyId,
    pub name: String,
    pub tax_id: String,
    pub is_enabled: bool,
}

impl Company {
    pub fn summary(&self) -> CompanySummary {
        CompanySummary {
            id: self.id,
            name: self.name.clone(),
            tax_id: self.tax_id.clone(),
            is_enabled: self.is_enabled,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompanyPayload {
    #[validate(length(min = 2, message = "O nome deve ter no mínimo 2 caracteres"))]
    #[schema(example = "Polacchini Comércio LTDA")]
    pub name: String,

    #[validate(length(min = 11, max = 18, message = "Documento inválido"))]
    #[schema(example = "12.345.678/0001-90")]
    pub tax_id: String,

    #[validate(nested)]
    pub address: Address,

    pub phone: Option<String>,

    #[validate(email(message = "E-mail inválido"))]
    pub email: Option<String>,
}
