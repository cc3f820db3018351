// src/main.rs

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use expense_backend::{
    config::{AppState, Settings},
    docs::ApiDoc,
    handlers,
    middleware::auth::tenant_guard,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logger: RUST_LOG manda; sem ele, info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar.
    let settings = Settings::from_env()?;
    let app_state = AppState::new(settings).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    sqlx::migrate!().run(&app_state.db_pool).await?;
    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

    // Job de virada de mês (contadores de uso)
    let reset_job = app_state
        .tenant_service
        .spawn_monthly_reset(Duration::from_secs(3600), app_state.shutdown.clone());

    // Limpeza dos canais de tempo real sem assinantes
    let hub = app_state.stream_hub.clone();
    let hub_shutdown = app_state.shutdown.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = hub_shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = hub.cleanup().await;
                    if removed > 0 {
                        tracing::debug!(removed, "canais de stream removidos");
                    }
                }
            }
        }
    });

    let request_routes = Router::new()
        .route(
            "/",
            post(handlers::requests::register_request).get(handlers::requests::list_requests),
        )
        .route("/{id}", get(handlers::requests::get_request))
        .route("/{id}/votes", post(handlers::requests::cast_vote))
        .route("/{id}/receive", post(handlers::requests::mark_received))
        .layer(DefaultBodyLimit::max(app_state.settings.max_upload_bytes));

    let notification_routes = Router::new()
        .route("/", get(handlers::notifications::list_notifications))
        .route("/{id}/open", post(handlers::notifications::mark_opened));

    let company_routes = Router::new()
        .route(
            "/",
            get(handlers::companies::list_companies).post(handlers::companies::create_company),
        )
        .route("/{id}", delete(handlers::companies::disable_company));

    let user_routes = Router::new()
        .route("/me", get(handlers::users::get_me))
        .route("/approvers", get(handlers::users::list_approvers));

    // Tudo abaixo exige token + tenant resolvido
    let protected = Router::new()
        .nest("/requests", request_routes)
        .nest("/notifications", notification_routes)
        .nest("/companies", company_routes)
        .nest("/users", user_routes)
        .route("/tenant", get(handlers::tenancy::get_current_tenant))
        .route("/stream", get(handlers::stream::stream_events))
        .layer(axum_middleware::from_fn_with_state(app_state.clone(), tenant_guard));

    // Combina tudo no router principal
    let shutdown = app_state.shutdown.clone();
    let bind_addr = app_state.settings.bind_addr;
    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api", protected)
        .with_state(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("desligando...");
            shutdown.cancel();
        })
        .await?;

    let _ = reset_job.await;
    Ok(())
}
