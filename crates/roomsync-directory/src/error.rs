use thiserror::Error;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("room not found")]
    NotFound,

    #[error("registry edit lost to concurrent writers after {0} attempts")]
    Contention(usize),

    #[error("no usable data directory on this platform")]
    NoDataDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DirectoryError>;
