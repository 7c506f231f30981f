use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use uuid::Uuid;

const MAX_DOCUMENT_NAME_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum DocumentStorageError {
    #[error("document not found")]
    NotFound,
    #[error("invalid document name")]
    InvalidName,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocumentStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Stores document bytes on the local filesystem, keyed `{project_id}_{name}`.
/// Metadata rows live in the relational store; this only holds the bytes.
pub struct DocumentStorage {
    base_path: PathBuf,
}

impl DocumentStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            base_path: data_dir.join("documents"),
        }
    }

    fn object_path(&self, project_id: &str, name: &str) -> PathBuf {
        self.base_path.join(format!("{project_id}_{name}"))
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    pub async fn exists(&self, project_id: &str, name: &str) -> Result<bool, DocumentStorageError> {
        validate_name(name)?;
        Ok(self.object_path(project_id, name).exists())
    }

    pub async fn get(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<(BufReader<File>, i64), DocumentStorageError> {
        validate_name(name)?;
        let path = self.object_path(project_id, name);
        let file = File::open(&path)
            .await
            .map_err(DocumentStorageError::from_io)?;

        let metadata = file.metadata().await?;
        let size = metadata.len() as i64;

        Ok((BufReader::new(file), size))
    }

    pub async fn put(
        &self,
        project_id: &str,
        name: &str,
        data: &[u8],
    ) -> Result<(), DocumentStorageError> {
        validate_name(name)?;

        let temp_path = self.temp_path();
        if let Some(parent) = temp_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut temp_file = File::create(&temp_path).await?;
        temp_file.write_all(data).await?;
        temp_file.sync_all().await?;

        let final_path = self.object_path(project_id, name);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::rename(&temp_path, &final_path).await?;

        Ok(())
    }

    /// Moves a stored document to a new name within the same project.
    /// Used when a document's metadata is renamed.
    pub async fn rename(
        &self,
        project_id: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<(), DocumentStorageError> {
        validate_name(old_name)?;
        validate_name(new_name)?;

        let old_path = self.object_path(project_id, old_name);
        let new_path = self.object_path(project_id, new_name);

        fs::rename(&old_path, &new_path)
            .await
            .map_err(DocumentStorageError::from_io)
    }

    pub async fn delete(&self, project_id: &str, name: &str) -> Result<bool, DocumentStorageError> {
        validate_name(name)?;
        let path = self.object_path(project_id, name);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(DocumentStorageError::Io(e)),
        }
    }
}

fn validate_name(name: &str) -> Result<(), DocumentStorageError> {
    if name.is_empty() || name.len() > MAX_DOCUMENT_NAME_LEN {
        return Err(DocumentStorageError::InvalidName);
    }

    // Keys are flat; anything that could escape the documents directory is rejected
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(DocumentStorageError::InvalidName);
    }

    Ok(())
}

#[must_use]
pub fn is_valid_document_name(name: &str) -> bool {
    validate_name(name).is_ok()
}
