use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("d_model ({d_model}) must be divisible by the number of heads ({n_head})")]
    HeadMismatch { d_model: i64, n_head: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    #[error("Safetensors error: {0}")]
    SafeTensor(#[from] safetensors::SafeTensorError),

    #[error("Unsupported dtype in checkpoint: {0}")]
    UnsupportedDtype(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
