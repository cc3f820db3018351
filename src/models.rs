pub mod approval;
pub mod auth;
pub mod company;
pub mod notification;
pub mod request;
pub mod tenancy;
