pub mod access;
pub mod account_service;
pub mod error;
pub mod migration;
pub mod ownership;
pub mod photo_service;

pub use access::{ACCESS_URL_TTL, AccessUrlIssuer};
pub use account_service::AccountService;
pub use error::{OwnershipError, ServiceError, ServiceResult};
pub use migration::{Settlement, VisibilityChange, VisibilityMigrator};
pub use ownership::OwnershipResolver;
pub use photo_service::PhotoService;
