use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalystError {
    // Oracle errors
    #[error("Oracle request failed: {0}")]
    OracleRequest(String),

    #[error("Oracle response parse error: {0}")]
    OracleParse(String),

    #[error("Oracle call timed out after {0}s")]
    OracleTimeout(u64),

    // Store errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    // Entity index errors
    #[error("Entity index error: {0}")]
    Index(String),

    // Workflow errors
    #[error("Unknown workflow stage: {0}")]
    UnknownStage(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalystError>;
