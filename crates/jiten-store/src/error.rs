use std::path::PathBuf;

/// Errors produced by the transactional store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is already open")]
    AlreadyOpen,

    #[error("store is already opening")]
    AlreadyOpening,

    #[error("store is not open")]
    NotOpen,

    #[error("store is not ready")]
    NotReady,

    #[error("failed to open store at {path}: {message}; you may need to reset the dictionary store")]
    Open { path: PathBuf, message: String },

    #[error("store has no object stores; the backing file is corrupted")]
    Corrupted,

    #[error("{message}; you may need to reset the dictionary store")]
    Transaction { message: String },

    #[error("unknown object store: {0}")]
    UnknownStore(String),

    #[error("unknown index {index} on object store {store}")]
    UnknownIndex { store: String, index: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("row codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("delete request failed: {0}")]
    DeleteFailed(String),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<redb::StorageError> for StoreError {
    fn from(e: redb::StorageError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(e: redb::TableError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(e: redb::CommitError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        StoreError::Transaction {
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Join(e.to_string())
    }
}
