pub mod companies;
pub mod notifications;
pub mod requests;
pub mod stream;
pub mod tenancy;
pub mod users;
