mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &User) -> Result<()>;
    fn get_user(&self, id: &str) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    fn delete_user(&self, id: &str) -> Result<bool>;

    // Session operations
    fn create_session(&self, session: &Session) -> Result<()>;
    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>>;
    fn delete_session(&self, id: &str) -> Result<bool>;
    fn delete_expired_sessions(&self) -> Result<usize>;
    fn update_session_last_used(&self, id: &str) -> Result<()>;

    // Project operations
    //
    // create_project inserts the project and the owner's participation row in
    // one transaction; a partial creation must never be observable.
    fn create_project(&self, project: &Project) -> Result<()>;
    fn get_project(&self, id: &str) -> Result<Option<Project>>;
    fn get_project_by_owner_and_name(&self, owner_id: &str, name: &str) -> Result<Option<Project>>;
    fn list_participant_projects(&self, user_id: &str) -> Result<Vec<Project>>;
    fn update_project(&self, project: &Project) -> Result<()>;
    fn delete_project(&self, id: &str) -> Result<bool>;

    // Participation operations
    fn create_participation(&self, user_id: &str, project_id: &str) -> Result<()>;
    fn get_participation(&self, user_id: &str, project_id: &str) -> Result<Option<Participation>>;
    fn list_project_participants(&self, project_id: &str) -> Result<Vec<User>>;
    fn count_project_participants(&self, project_id: &str) -> Result<i32>;

    // Document operations
    fn create_document(&self, document: &Document) -> Result<()>;
    fn get_document(&self, id: &str) -> Result<Option<Document>>;
    fn get_project_document_by_name(&self, project_id: &str, name: &str)
    -> Result<Option<Document>>;
    fn list_project_documents(&self, project_id: &str) -> Result<Vec<Document>>;
    fn update_document(&self, document: &Document) -> Result<()>;
    fn delete_document(&self, id: &str) -> Result<bool>;
}
