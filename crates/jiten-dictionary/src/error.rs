use jiten_store::StoreError;

/// Errors produced by the dictionary layer.
#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("row codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unknown term meta mode: {0}")]
    UnknownTermMetaMode(String),

    #[error("cannot purge database while opening")]
    PurgeWhileOpening,

    #[error("database worker is unavailable")]
    WorkerUnavailable,

    #[error("no rasterizer is loaded for media drawing")]
    RasterizerUnavailable,

    #[error("svg rasterization failed: {0}")]
    Svg(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for DictionaryError {
    fn from(e: tokio::task::JoinError) -> Self {
        DictionaryError::Join(e.to_string())
    }
}
