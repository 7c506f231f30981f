//! # Dossier
//!
//! A project and document management server, usable both as a standalone
//! binary and as a library.
//!
//! ## Library Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::path::PathBuf;
//! use dossier::blob::DocumentStorage;
//! use dossier::server::{AppState, create_router};
//! use dossier::store::{SqliteStore, Store};
//!
//! let store = SqliteStore::new(&PathBuf::from("./data/dossier.db")).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState {
//!     store: Arc::new(store),
//!     blob: DocumentStorage::new(&PathBuf::from("./data")),
//!     public_base_url: None,
//! });
//! let router = create_router(state);
//! // Serve with axum...
//! ```

pub mod auth;
pub mod blob;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
