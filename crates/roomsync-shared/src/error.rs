use thiserror::Error;

/// Failures at the wire protocol boundary.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unrecognized message: {0}")]
    Unrecognized(String),
}
