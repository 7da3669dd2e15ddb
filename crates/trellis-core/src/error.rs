use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Graph errors
    #[error("circular dependency detected at node {0}")]
    CycleDetected(String),

    // Node execution errors
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("invalid parameter {name}: {message}")]
    Param { name: String, message: String },

    #[error("Error in node {node}: {message}")]
    NodeFailed { node: String, message: String },

    // Persistence errors
    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("database error: {0}")]
    Database(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrellisError>;
