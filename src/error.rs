use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("dataset directory not found: {0}")]
    MissingDirectory(PathBuf),

    #[error("no decodable images found under {0}")]
    EmptyDataset(PathBuf),

    #[error("failed to load image at '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("probability vector has {actual} entries but the class dictionary holds {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("probability for class {index} is not a finite number")]
    NonFiniteProbability { index: usize },

    #[error("invalid class dictionary: {0}")]
    ClassDictionary(String),

    #[error("no checkpoint found in {0}")]
    MissingCheckpoint(PathBuf),

    #[error("failed to load configuration from {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to record model weights: {0}")]
    Recorder(String),

    #[error("failed to read tensor data: {0}")]
    TensorData(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<burn::record::RecorderError> for Error {
    fn from(err: burn::record::RecorderError) -> Self {
        Error::Recorder(format!("{err:?}"))
    }
}
