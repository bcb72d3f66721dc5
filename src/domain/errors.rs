use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model not found: {model_id}")]
    ModelNotFound { model_id: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("batch submitted empty to inference backend")]
    EmptyBatch,

    #[error("model loading failed: {message}")]
    ModelLoadFailed { message: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InferenceError>;
