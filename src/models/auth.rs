// src/models/auth.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::approval::Level;

pub type UserId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Requester,
    Manager,
    Director,
    Finance,
    Assistant,
}

impl Role {
    /// Quem pode votar em cada nível.
    pub fn can_vote_at(self, level: Level) -> bool {
        matches!(
            (self, level),
            (Role::Manager, Level::Manager) | (Role::Director, Level::Director)
        )
    }

    /// Financeiro e assistentes enxergam todas as solicitações da empresa.
    pub fn sees_whole_tenant(self) -> bool {
        matches!(self, Role::Finance | Role::Assistant)
    }

    /// Papel exigido para aparecer em cada coleção de aprovadores.
    pub fn for_level(level: Level) -> Self {
        match level {
            Level::Manager => Role::Manager,
            Level::Director => Role::Director,
        }
    }
}

// Representa um usuário vindo do banco de dados.
// Senhas e sessões ficam fora deste serviço.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = "Maria Souza")]
    pub full_name: String,
    pub role: Role,
    #[schema(example = "Compras")]
    pub department: Option<String>,
    pub is_enabled: bool,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            role: self.role,
            department: self.department.clone(),
        }
    }
}

// O resumo que aparece dentro das views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub full_name: String,
    pub role: Role,
    pub department: Option<String>,
}

impl UserSummary {
    /// Usado quando o usuário não foi encontrado no diretório (ex.: desativado depois).
    pub fn unknown(id: UserId, role: Role) -> Self {
        Self {
            id,
            full_name: format!("Usuário #{}", id),
            role,
            department: None,
        }
    }
}

// Quem está chamando, como veio da autenticação (antes de resolver o tenant)
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: User,
    pub tenant_claim: Option<Uuid>,
}

// Contexto explícito passado a todas as operações do núcleo.
// Resolvido uma vez na borda, nunca a partir do corpo da requisição.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    pub tenant_id: Uuid,
    pub user_id: UserId,
    pub role: Role,
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,            // Subject (ID do usuário)
    pub tenant: Option<Uuid>,   // Tenant ao qual a sessão pertence
    pub exp: usize,             // Expiration time (quando o token expira)
    pub iat: usize,             // Issued At (quando o token foi criado)
}
