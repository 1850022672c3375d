use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for qms_types::QmsError {
    fn from(err: StoreError) -> Self {
        qms_types::QmsError::Store {
            detail: err.to_string(),
        }
    }
}
