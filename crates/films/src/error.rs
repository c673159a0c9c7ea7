use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilmError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Clustering failed for k={k} over {pixel_count} pixels: {reason}")]
    ClusteringFailure {
        k: usize,
        pixel_count: usize,
        reason: String,
    },

    #[error("Label map corruption: {0}")]
    LabelMapCorruption(String),

    #[error("Dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FilmError>;
