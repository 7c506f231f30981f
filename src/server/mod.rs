pub mod access;
pub mod documents;
pub mod dto;
pub mod projects;
pub mod response;
mod router;
pub mod users;
pub mod validation;

pub use router::{AppState, create_router};
