//! Error types for Ascend.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AscendError {
    #[error("Unknown activity kind: {0}")]
    UnknownKind(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
