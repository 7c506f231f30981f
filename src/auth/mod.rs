pub mod helpers;
mod middleware;
mod token;

pub use middleware::{AuthError, RequireUser};
pub use token::{CredentialHasher, SessionToken, token_lookup};
