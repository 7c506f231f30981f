use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

use super::{documents, projects, users};
use crate::blob::DocumentStorage;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blob: DocumentStorage,
    /// Public base URL for external access. Used for document locators.
    pub public_base_url: Option<String>,
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Users
        .route("/users", post(users::register_user))
        .route("/users/login", post(users::login))
        .route("/users/logout", post(users::logout))
        // Projects
        .route("/projects", get(projects::list_projects))
        .route("/projects", post(projects::create_project))
        .route("/projects/{id}", get(projects::get_project))
        .route("/projects/{id}", patch(projects::update_project))
        .route("/projects/{id}", delete(projects::delete_project))
        // Participations
        .route(
            "/projects/{id}/participants",
            get(projects::list_participants),
        )
        .route(
            "/projects/{id}/participants",
            post(projects::grant_participation),
        )
        // Documents
        .route(
            "/projects/{id}/documents",
            get(documents::list_documents),
        )
        .route(
            "/projects/{id}/documents",
            post(documents::upload_documents),
        )
        .route("/documents/{id}", get(documents::get_document))
        .route("/documents/{id}", patch(documents::update_document))
        .route("/documents/{id}", delete(documents::delete_document))
        .route("/documents/{id}/download", get(documents::download_document))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
