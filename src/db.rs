pub mod company_repo;
pub mod directory;
pub mod notification_repo;
pub mod request_repo;
pub mod tenancy_repo;
pub mod user_repo;

pub use company_repo::CompanyRepository;
pub use directory::{DirectoryStore, PgDirectory};
pub use notification_repo::{NotificationRepository, NotificationStore};
pub use request_repo::{RequestRepository, RequestStore};
pub use tenancy_repo::TenantRepository;
pub use user_repo::UserRepository;
