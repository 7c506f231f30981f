mod storage;

pub use storage::{DocumentStorage, DocumentStorageError, is_valid_document_name};
