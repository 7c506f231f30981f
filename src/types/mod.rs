mod action;
mod models;

pub use action::{ProjectAction, Role};
pub use models::*;
