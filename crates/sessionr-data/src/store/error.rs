use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store initialization failed: {0}")]
    Initialization(String),

    #[error("Insert failed: {0}")]
    Insert(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid stored row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
