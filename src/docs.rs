// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Requests ---
        handlers::requests::register_request,
        handlers::requests::cast_vote,
        handlers::requests::mark_received,
        handlers::requests::get_request,
        handlers::requests::list_requests,

        // --- Notifications ---
        handlers::notifications::list_notifications,
        handlers::notifications::mark_opened,
        handlers::stream::stream_events,

        // --- Companies ---
        handlers::companies::list_companies,
        handlers::companies::create_company,
        handlers::companies::disable_company,

        // --- Users ---
        handlers::users::get_me,
        handlers::users::list_approvers,

        // --- Tenancy ---
        handlers::tenancy::get_current_tenant,
    ),
    components(
        schemas(
            // --- Aprovação ---
            models::approval::Outcome,
            models::approval::Level,
            models::request::AttachmentKind,
            models::request::ApproverView,
            models::request::RequestView,

            // --- Auth ---
            models::auth::Role,
            models::auth::User,
            models::auth::UserSummary,

            // --- Companies ---
            models::company::Address,
            models::company::Company,
            models::company::CompanySummary,
            models::company::CreateCompanyPayload,

            // --- Notifications ---
            models::notification::Notification,

            // --- Tenancy ---
            models::tenancy::PlanTier,
            models::tenancy::Tenant,

            // --- Payloads ---
            handlers::requests::RegisterRequestPayload,
            handlers::requests::CastVotePayload,
        )
    ),
    tags(
        (name = "Requests", description = "Solicitações de reembolso e fluxo de aprovação"),
        (name = "Notifications", description = "Avisos persistidos e eventos em tempo real"),
        (name = "Companies", description = "Empresas faturadas"),
        (name = "Users", description = "Dados do usuário e diretório de aprovadores"),
        (name = "Tenancy", description = "Plano, uso e limites do tenant")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
