// src/config.rs

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio_util::sync::CancellationToken;

use crate::{
    db::{
        company_repo::CompanyRepository, directory::PgDirectory,
        notification_repo::NotificationRepository, request_repo::RequestRepository,
        tenancy_repo::TenantRepository, user_repo::UserRepository,
    },
    services::{
        attachment_service::LocalAttachmentSink, auth::AuthService, company_service::CompanyService,
        notification_service::NotificationService, request_service::RequestService,
        stream_hub::StreamHub, tenancy_service::TenantService,
    },
};

// ---
// Configuração (variáveis de ambiente)
// ---
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: SocketAddr,
    pub attachments_dir: PathBuf,
    pub db_max_connections: u32,
    pub notification_ttl_days: i64,
    pub side_effect_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Settings {
    /// Carrega o `.env` (se existir) e lê as variáveis do processo.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Monta a configuração a partir de uma função de busca (facilita testes).
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{} deve ser definida", key));

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            attachments_dir: lookup("ATTACHMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./attachments")),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            notification_ttl_days: parse_or(&lookup, "NOTIFICATION_TTL_DAYS", 30)?,
            side_effect_timeout: Duration::from_secs(parse_or(&lookup, "SIDE_EFFECT_TIMEOUT_SECS", 10)?),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} inválida ({:?}): {}", key, raw, e)),
    }
}

// ---
// Estado compartilhado (axum State)
// ---
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub auth_service: AuthService,
    pub request_service: RequestService,
    pub notification_service: NotificationService,
    pub company_service: CompanyService,
    pub tenant_service: TenantService,
    pub stream_hub: StreamHub,
    // Cancelado no desligamento; cada operação recebe um filho
    pub shutdown: CancellationToken,
}

impl AppState {
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        // Conecta ao banco de dados, usando '?' para propagar erros
        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("falha ao conectar ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        // --- Monta o gráfico de dependências ---
        let stream_hub = StreamHub::new();

        let notification_service = NotificationService::new(
            Arc::new(NotificationRepository::new(db_pool.clone())),
            Arc::new(stream_hub.clone()),
            chrono::Duration::days(settings.notification_ttl_days),
        );

        let request_service = RequestService::new(
            Arc::new(RequestRepository::new(db_pool.clone())),
            Arc::new(PgDirectory::new(db_pool.clone())),
            Arc::new(LocalAttachmentSink::new(settings.attachments_dir.clone())),
            notification_service.clone(),
            settings.side_effect_timeout,
        );

        let auth_service = AuthService::new(UserRepository::new(db_pool.clone()), settings.jwt_secret.clone());
        let company_service = CompanyService::new(CompanyRepository::new(), db_pool.clone());
        let tenant_service = TenantService::new(TenantRepository::new(db_pool.clone()));

        Ok(Self {
            db_pool,
            settings: Arc::new(settings),
            auth_service,
            request_service,
            notification_service,
            company_service,
            tenant_service,
            stream_hub,
            shutdown: CancellationToken::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let settings = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/expenses"),
            ("JWT_SECRET", "segredo"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_addr.port(), 3000);
        assert_eq!(settings.db_max_connections, 5);
        assert_eq!(settings.notification_ttl_days, 30);
        assert_eq!(settings.side_effect_timeout, Duration::from_secs(10));
        assert_eq!(settings.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.attachments_dir, PathBuf::from("./attachments"));
    }

    #[test]
    fn missing_secret_fails() {
        let err = Settings::from_lookup(lookup(&[("DATABASE_URL", "postgres://x")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn unparsable_number_fails() {
        let err = Settings::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://x"),
            ("JWT_SECRET", "s"),
            ("DB_MAX_CONNECTIONS", "muitas"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
