use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::access::authorize;
use crate::server::dto::UpdateDocumentRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_document_name;
use crate::store::Store;
use crate::types::{Document, Project, ProjectAction, User};

const DEFAULT_FORMAT: &str = "application/octet-stream";

/// Builds the locator persisted in document metadata. The locator embeds
/// project id and filename, so it is unique exactly when the name is unique
/// within the project.
fn document_url(state: &AppState, project_id: &str, name: &str) -> String {
    let path = format!("/api/v1/projects/{project_id}/documents/{name}");
    match &state.public_base_url {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        None => path,
    }
}

fn load_authorized_project(
    store: &dyn Store,
    user: &User,
    project_id: &str,
    action: ProjectAction,
) -> Result<Project, ApiError> {
    let project = store
        .get_project(project_id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    authorize(store, user, &project, action)?;
    Ok(project)
}

pub async fn upload_documents(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = load_authorized_project(
        store,
        &auth.user,
        &project_id,
        ProjectAction::UploadDocument,
    )?;

    let mut created = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let name = file_name.to_lowercase().replace(' ', "_");
        validate_document_name(&name)?;

        // Reject before touching the blob store; writing first would
        // overwrite the existing document's bytes
        if store
            .get_project_document_by_name(&project.id, &name)
            .api_err("Failed to check document name")?
            .is_some()
        {
            return Err(ApiError::conflict(format!(
                "Document '{name}' already exists in this project"
            )));
        }

        let format = field
            .content_type()
            .map_or_else(|| DEFAULT_FORMAT.to_string(), str::to_string);

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;

        state
            .blob
            .put(&project.id, &name, &data)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store document bytes: {e}")))?;

        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            name: name.clone(),
            format,
            file_url: document_url(&state, &project.id, &name),
            project_id: project.id.clone(),
            created_at: now,
            updated_at: now,
        };

        // Bytes first, metadata second. On failure remove only bytes this
        // request wrote: a conflict means a racing duplicate slipped past
        // the pre-check and the key now backs the surviving document
        let result = store.create_document(&document);
        if let Err(e) = &result {
            if !matches!(e, Error::Conflict(_)) {
                if let Err(cleanup) = state.blob.delete(&project.id, &name).await {
                    tracing::warn!("Failed to clean up blob after metadata failure: {cleanup}");
                }
            }
        }
        result.api_err("Failed to create document")?;

        created.push(document);
    }

    if created.is_empty() {
        return Err(ApiError::bad_request("No documents were received to upload"));
    }

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

pub async fn list_documents(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = load_authorized_project(
        store,
        &auth.user,
        &project_id,
        ProjectAction::ListDocuments,
    )?;

    let documents = store
        .list_project_documents(&project.id)
        .api_err("Failed to list documents")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(documents)))
}

pub async fn get_document(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let document = store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;

    load_authorized_project(
        store,
        &auth.user,
        &document.project_id,
        ProjectAction::ViewDocument,
    )?;

    Ok::<_, ApiError>(Json(ApiResponse::success(document)))
}

pub async fn download_document(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let document = store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;

    load_authorized_project(
        store,
        &auth.user,
        &document.project_id,
        ProjectAction::DownloadDocument,
    )?;

    let (reader, size) = state
        .blob
        .get(&document.project_id, &document.name)
        .await
        .map_err(|e| match e {
            crate::blob::DocumentStorageError::NotFound => {
                ApiError::not_found("Document bytes not found")
            }
            e => ApiError::internal(format!("Failed to read document bytes: {e}")),
        })?;

    let headers = [
        (header::CONTENT_TYPE, document.format.clone()),
        (header::CONTENT_LENGTH, size.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", document.name),
        ),
    ];

    Ok::<_, ApiError>((headers, Body::from_stream(ReaderStream::new(reader))))
}

pub async fn update_document(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDocumentRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut document = store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;

    load_authorized_project(
        store,
        &auth.user,
        &document.project_id,
        ProjectAction::UpdateDocument,
    )?;

    // Partial update: absent fields keep their current value
    let old_name = document.name.clone();
    let mut renamed = false;

    if let Some(name) = req.name {
        let name = name.to_lowercase().replace(' ', "_");
        validate_document_name(&name)?;
        if name != document.name {
            // Renaming onto another document's name would clobber its
            // bytes; reject before any blob move
            if store
                .get_project_document_by_name(&document.project_id, &name)
                .api_err("Failed to check document name")?
                .is_some()
            {
                return Err(ApiError::conflict(format!(
                    "Document '{name}' already exists in this project"
                )));
            }

            match state.blob.rename(&document.project_id, &old_name, &name).await {
                Ok(()) => renamed = true,
                // Metadata may point at bytes we never stored (external locator)
                Err(crate::blob::DocumentStorageError::NotFound) => {
                    tracing::warn!("No stored bytes for document {} during rename", document.id);
                }
                Err(e) => {
                    return Err(ApiError::internal(format!(
                        "Failed to move document bytes: {e}"
                    )));
                }
            }
            document.file_url = document_url(&state, &document.project_id, &name);
            document.name = name;
        }
    }
    if let Some(file_url) = req.file_url {
        document.file_url = file_url;
    }

    // Undo the blob move on failure so bytes and metadata stay aligned.
    // A conflict means a racing rename took the key; leave the bytes
    // where the surviving metadata points
    let result = store.update_document(&document);
    if let Err(e) = &result {
        if renamed && !matches!(e, Error::Conflict(_)) {
            if let Err(undo) = state
                .blob
                .rename(&document.project_id, &document.name, &old_name)
                .await
            {
                tracing::warn!(
                    "Failed to undo blob rename for document {}: {undo}",
                    document.id
                );
            }
        }
    }
    result.api_err("Failed to update document")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(document)))
}

pub async fn delete_document(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let document = store
        .get_document(&id)
        .api_err("Failed to get document")?
        .or_not_found("Document not found")?;

    load_authorized_project(
        store,
        &auth.user,
        &document.project_id,
        ProjectAction::DeleteDocument,
    )?;

    store
        .delete_document(&document.id)
        .api_err("Failed to delete document")?;

    if let Err(e) = state.blob.delete(&document.project_id, &document.name).await {
        tracing::warn!("Failed to delete blob for document {}: {e}", document.id);
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
