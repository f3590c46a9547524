use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported database backend: {0}")]
    UnsupportedBackend(String),

    #[error("Stored {column} value could not be decoded: {value}")]
    Decode { column: &'static str, value: String },

    #[error("Stored JSON could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
