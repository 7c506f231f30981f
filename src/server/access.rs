use crate::server::response::{ApiError, StoreResultExt};
use crate::store::Store;
use crate::types::{Project, ProjectAction, Role, User};

/// Returns true if the user is the project's owner.
#[must_use]
pub fn is_owner(project: &Project, user: &User) -> bool {
    project.owner_id == user.id
}

/// Returns true if the user holds a participation row for the project.
/// The owner always does; project creation inserts that row atomically.
pub fn is_participant(
    store: &dyn Store,
    project_id: &str,
    user_id: &str,
) -> Result<bool, ApiError> {
    let participation = store
        .get_participation(user_id, project_id)
        .api_err("Failed to check participation")?;
    Ok(participation.is_some())
}

/// Central authorization decision point. Every project and document operation
/// dispatches through here before mutating anything; handlers never
/// re-implement the checks.
pub fn authorize(
    store: &dyn Store,
    user: &User,
    project: &Project,
    action: ProjectAction,
) -> Result<(), ApiError> {
    let allowed = match action.required_role() {
        Role::Owner => is_owner(project, user),
        Role::Participant => is_participant(store, &project.id, &user.id)?,
    };

    if !allowed {
        return Err(ApiError::forbidden(format!(
            "Not permitted to {action} for this project"
        )));
    }
    Ok(())
}
