// src/services/auth.rs

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserRepository,
    models::auth::{Claims, Principal, UserId},
};

// Login e senhas ficam em outro serviço; aqui só validamos o token da sessão.
#[derive(Clone)]
pub struct AuthService {
    user_repo: UserRepository,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(user_repo: UserRepository, jwt_secret: String) -> Self {
        Self { user_repo, jwt_secret }
    }

    /// Valida o token e carrega o usuário (somente usuários ativos).
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AppError> {
        let claims = decode_token(&self.jwt_secret, token)?;

        let user = self
            .user_repo
            .find_enabled_for_session(claims.sub)
            .await?
            .ok_or(AppError::InvalidToken)?;

        Ok(Principal { user, tenant_claim: claims.tenant })
    }
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|_| AppError::InvalidToken)?;

    Ok(token_data.claims)
}

pub fn issue_token(
    secret: &str,
    user_id: UserId,
    tenant: Option<Uuid>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        tenant,
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_keeps_tenant_claim() {
        let tenant = Uuid::new_v4();
        let token = issue_token("segredo", 42, Some(tenant), Utc::now(), Duration::hours(1)).unwrap();
        let claims = decode_token("segredo", &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.tenant, Some(tenant));
    }

    #[test]
    fn wrong_secret_or_expired_token_is_invalid() {
        let token = issue_token("segredo", 42, None, Utc::now(), Duration::hours(1)).unwrap();
        assert!(matches!(decode_token("outro", &token), Err(AppError::InvalidToken)));

        let old = Utc::now() - Duration::days(2);
        let expired = issue_token("segredo", 42, None, old, Duration::hours(1)).unwrap();
        assert!(matches!(decode_token("segredo", &expired), Err(AppError::InvalidToken)));
    }
}
