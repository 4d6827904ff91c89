pub mod middleware;
pub mod password;
pub mod token;

pub use middleware::{CallerContext, Identity, detect_identity, require_identity};
pub use password::{Argon2Hasher, CredentialHasher};
pub use token::{Claims, SessionToken, TokenCodec, TokenError};
