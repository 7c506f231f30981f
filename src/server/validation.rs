use crate::blob::is_valid_document_name;
use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 50;
const MAX_PROJECT_NAME_LEN: usize = 100;
const MAX_DESCRIPTION_LEN: usize = 500;

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if username.contains(char::is_whitespace) {
        return Err(ApiError::bad_request("Username cannot contain whitespace"));
    }
    Ok(())
}

pub fn validate_password(password: &str, check_password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }
    // Byte-for-byte comparison; trimming or normalizing would mask mismatches
    if password.as_bytes() != check_password.as_bytes() {
        return Err(ApiError::bad_request(
            "Password and its confirmation don't match",
        ));
    }
    Ok(())
}

pub fn validate_project_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::bad_request("Project name cannot be empty"));
    }
    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Project name cannot exceed {MAX_PROJECT_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<(), ApiError> {
    if description.len() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_document_name(name: &str) -> Result<(), ApiError> {
    if !is_valid_document_name(name) {
        return Err(ApiError::bad_request(
            "Document name must be a plain filename without path separators",
        ));
    }
    Ok(())
}
