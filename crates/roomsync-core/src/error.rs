use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("registry error: {0}")]
    Directory(#[from] roomsync_directory::DirectoryError),

    #[error("session task is gone")]
    SessionGone,
}
