// src/db/user_repo.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_tenant_tx, begin_user_tx},
        error::AppError,
    },
    models::auth::{Role, User, UserId},
};

// O repositório de usuários. Cadastro e credenciais ficam fora deste serviço:
// aqui só há leitura.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Usado pelo guard de autenticação. Ainda não há tenant resolvido,
    // então a RLS libera apenas a linha do próprio usuário.
    pub async fn find_enabled_for_session(&self, user_id: UserId) -> Result<Option<User>, AppError> {
        let mut tx = begin_user_tx(&self.pool, user_id).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, tenant_id, full_name, role, department, is_enabled
            FROM users
            WHERE id = $1 AND is_enabled = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(user)
    }

    // Busca vários usuários do tenant de uma vez (inclusive desativados,
    // pois solicitações antigas continuam citando-os)
    pub async fn find_many(&self, tenant_id: Uuid, ids: &[UserId]) -> Result<Vec<User>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, tenant_id, full_name, role, department, is_enabled
            FROM users
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(users)
    }

    // Usuários ativos de um papel, em ordem alfabética (preenche o formulário de registro)
    pub async fn list_by_role(&self, tenant_id: Uuid, role: Role) -> Result<Vec<User>, AppError> {
        let mut tx = begin_tenant_tx(&self.pool, tenant_id).await?;

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, tenant_id, full_name, role, department, is_enabled
            FROM users
            WHERE tenant_id = $1 AND role = $2 AND is_enabled = TRUE
            ORDER BY full_name ASC
            "#,
        )
        .bind(tenant_id)
        .bind(role)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(users)
    }
}
