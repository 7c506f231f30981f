use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::access::{authorize, is_owner};
use crate::server::dto::{
    CreateProjectRequest, GrantAccessRequest, ParticipantResponse, UpdateProjectRequest,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{validate_description, validate_project_name};
use crate::types::{Project, ProjectAction};

pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let projects = state
        .store
        .list_participant_projects(&auth.user.id)
        .api_err("Failed to list projects")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    validate_project_name(&req.name)?;
    if let Some(description) = &req.description {
        validate_description(description)?;
    }

    // Name uniqueness is scoped per owner; another owner may reuse the name
    if store
        .get_project_by_owner_and_name(&auth.user.id, &req.name)
        .api_err("Failed to check project name")?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "Project name '{}' already in use",
            req.name
        )));
    }

    let now = Utc::now();
    let project = Project {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        owner_id: auth.user.id.clone(),
        created_at: now,
        updated_at: now,
    };

    // Inserts the project and the owner's participation in one transaction
    store
        .create_project(&project)
        .api_err("Failed to create project")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn get_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    authorize(store, &auth.user, &project, ProjectAction::ViewProject)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

pub async fn update_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateProjectRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let mut project = store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    authorize(store, &auth.user, &project, ProjectAction::UpdateProject)?;

    if let Some(name) = req.name {
        validate_project_name(&name)?;
        if name != project.name
            && store
                .get_project_by_owner_and_name(&project.owner_id, &name)
                .api_err("Failed to check project name")?
                .is_some()
        {
            return Err(ApiError::conflict(format!(
                "Project name '{name}' already in use"
            )));
        }
        project.name = name;
    }
    // Absent keeps the current description; an explicit null clears it
    if let Some(description) = req.description {
        if let Some(value) = &description {
            validate_description(value)?;
        }
        project.description = description;
    }

    store
        .update_project(&project)
        .api_err("Failed to update project")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

pub async fn delete_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    // A non-owner gets the same 404 as a missing project so that project
    // existence is not leaked to users outside it
    if !is_owner(&project, &auth.user) {
        return Err(ApiError::not_found("Project not found"));
    }

    let documents = store
        .list_project_documents(&project.id)
        .api_err("Failed to list documents")?;

    store
        .delete_project(&project.id)
        .api_err("Failed to delete project")?;

    // Metadata rows cascade in the store; stored bytes are cleaned up
    // afterwards, best-effort
    for document in documents {
        if let Err(e) = state.blob.delete(&project.id, &document.name).await {
            tracing::warn!(
                "Failed to delete blob for document {}: {e}",
                document.id
            );
        }
    }

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

pub async fn list_participants(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    authorize(store, &auth.user, &project, ProjectAction::ViewProject)?;

    let participants: Vec<ParticipantResponse> = store
        .list_project_participants(&project.id)
        .api_err("Failed to list participants")?
        .into_iter()
        .map(|user| ParticipantResponse {
            user_id: user.id,
            username: user.username,
        })
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(participants)))
}

pub async fn grant_participation(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<GrantAccessRequest>,
) -> impl IntoResponse {
    let store = state.store.as_ref();

    let project = store
        .get_project(&id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    authorize(store, &auth.user, &project, ProjectAction::GrantAccess)?;

    let invitee = store
        .get_user_by_username(&req.username)
        .api_err("Failed to look up user")?
        .or_not_found("User not found")?;

    if store
        .get_participation(&invitee.id, &project.id)
        .api_err("Failed to check participation")?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "User '{}' already participates in this project",
            invitee.username
        )));
    }

    // The participation primary key is the final authority under races
    store
        .create_participation(&invitee.id, &project.id)
        .api_err("Failed to grant participation")?;

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(ParticipantResponse {
            user_id: invitee.id,
            username: invitee.username,
        })),
    ))
}
