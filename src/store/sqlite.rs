use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Translates a unique-constraint violation into the conflict the pre-check
/// would have produced; the constraint is the final authority under races.
fn map_constraint(e: rusqlite::Error, conflict: Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            conflict
        }
        e => Error::from(e),
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        name: row.get(1)?,
        format: row.get(2)?,
        file_url: row.get(3)?,
        project_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        updated_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const USER_COLUMNS: &str = "id, username, password_hash, created_at";
const PROJECT_COLUMNS: &str = "id, name, description, owner_id, created_at, updated_at";
const DOCUMENT_COLUMNS: &str = "id, name, format, file_url, project_id, created_at, updated_at";

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id,
                    user.username,
                    user.password_hash,
                    format_datetime(&user.created_at),
                ],
            )
            .map_err(|e| {
                map_constraint(
                    e,
                    Error::Conflict(format!("username '{}' already in use", user.username)),
                )
            })?;
        Ok(())
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            row_to_user,
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_user(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO sessions (id, token_hash, token_lookup, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    session.id,
                    session.token_hash,
                    session.token_lookup,
                    session.user_id,
                    format_datetime(&session.created_at),
                    format_datetime(&session.expires_at),
                ],
            )
            .map_err(|e| map_constraint(e, Error::SessionLookupCollision))?;
        Ok(())
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, token_hash, token_lookup, user_id, created_at, expires_at, last_used_at
             FROM sessions WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    token_hash: row.get(1)?,
                    token_lookup: row.get(2)?,
                    user_id: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    expires_at: parse_datetime(&row.get::<_, String>(5)?),
                    last_used_at: row.get::<_, Option<String>>(6)?.map(|s| parse_datetime(&s)),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn delete_expired_sessions(&self) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM sessions WHERE expires_at < ?1",
            params![format_datetime(&Utc::now())],
        )?;
        Ok(rows)
    }

    fn update_session_last_used(&self, id: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET last_used_at = ?1 WHERE id = ?2",
            params![format_datetime(&Utc::now()), id],
        )?;
        Ok(())
    }

    // Project operations

    fn create_project(&self, project: &Project) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO projects (id, name, description, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                project.id,
                project.name,
                project.description,
                project.owner_id,
                format_datetime(&project.created_at),
                format_datetime(&project.updated_at),
            ],
        )
        .map_err(|e| {
            map_constraint(
                e,
                Error::Conflict(format!("project name '{}' already in use", project.name)),
            )
        })?;

        tx.execute(
            "INSERT INTO participations (user_id, project_id, created_at)
             VALUES (?1, ?2, ?3)",
            params![
                project.owner_id,
                project.id,
                format_datetime(&project.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            params![id],
            row_to_project,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_project_by_owner_and_name(&self, owner_id: &str, name: &str) -> Result<Option<Project>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE owner_id = ?1 AND name = ?2"),
            params![owner_id, name],
            row_to_project,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_participant_projects(&self, user_id: &str) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id, p.name, p.description, p.owner_id, p.created_at, p.updated_at
             FROM projects p
             JOIN participations pp ON p.id = pp.project_id
             WHERE pp.user_id = ?1
             ORDER BY p.name",
        )?;

        let rows = stmt.query_map(params![user_id], row_to_project)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_project(&self, project: &Project) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE projects SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    project.name,
                    project.description,
                    format_datetime(&Utc::now()),
                    project.id
                ],
            )
            .map_err(|e| {
                map_constraint(
                    e,
                    Error::Conflict(format!("project name '{}' already in use", project.name)),
                )
            })?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_project(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Participation operations

    fn create_participation(&self, user_id: &str, project_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO participations (user_id, project_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![user_id, project_id, format_datetime(&Utc::now())],
            )
            .map_err(|e| {
                map_constraint(
                    e,
                    Error::Conflict("user already participates in this project".to_string()),
                )
            })?;
        Ok(())
    }

    fn get_participation(&self, user_id: &str, project_id: &str) -> Result<Option<Participation>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, project_id, created_at
             FROM participations WHERE user_id = ?1 AND project_id = ?2",
            params![user_id, project_id],
            |row| {
                Ok(Participation {
                    user_id: row.get(0)?,
                    project_id: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_project_participants(&self, project_id: &str) -> Result<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT u.id, u.username, u.password_hash, u.created_at
             FROM users u
             JOIN participations pp ON u.id = pp.user_id
             WHERE pp.project_id = ?1
             ORDER BY u.username",
        )?;

        let rows = stmt.query_map(params![project_id], row_to_user)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn count_project_participants(&self, project_id: &str) -> Result<i32> {
        let conn = self.conn();
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM participations WHERE project_id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Document operations

    fn create_document(&self, document: &Document) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO documents (id, name, format, file_url, project_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    document.id,
                    document.name,
                    document.format,
                    document.file_url,
                    document.project_id,
                    format_datetime(&document.created_at),
                    format_datetime(&document.updated_at),
                ],
            )
            .map_err(|e| {
                map_constraint(
                    e,
                    Error::Conflict(format!("file url '{}' already in use", document.file_url)),
                )
            })?;
        Ok(())
    }

    fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            params![id],
            row_to_document,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_project_document_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<Option<Document>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ?1 AND name = ?2"
            ),
            params![project_id, name],
            row_to_document,
        )
        .optional()
        .map_err(Error::from)
    }

    fn list_project_documents(&self, project_id: &str) -> Result<Vec<Document>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE project_id = ?1 ORDER BY name"
        ))?;

        let rows = stmt.query_map(params![project_id], row_to_document)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn update_document(&self, document: &Document) -> Result<()> {
        let rows = self
            .conn()
            .execute(
                "UPDATE documents SET name = ?1, file_url = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    document.name,
                    document.file_url,
                    format_datetime(&Utc::now()),
                    document.id
                ],
            )
            .map_err(|e| {
                map_constraint(
                    e,
                    Error::Conflict(format!("file url '{}' already in use", document.file_url)),
                )
            })?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_document(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
