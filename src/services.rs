pub mod attachment_service;
pub mod auth;
pub mod company_service;
pub mod notification_service;
pub mod request_service;
pub mod stream_hub;
pub mod tenancy_service;
