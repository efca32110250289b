//! Error types for the client.

use permabundle_core::{CoreError, ValidationError};
use permabundle_transport::{Amount, RemoteError, UploadError};
use thiserror::Error;

/// Errors that can occur during client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Building, signing or encoding the envelope failed.
    #[error("envelope error: {0}")]
    Core(#[from] CoreError),

    /// A decoded envelope failed verification.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Chunked upload failed.
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// A remote call failed outside a chunked upload.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    /// Balance does not cover the price and funding is left to the caller.
    #[error("insufficient balance: price {price}, balance {balance}")]
    InsufficientBalance { price: Amount, balance: Amount },

    /// The operation was cancelled by the caller.
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            ClientError::Cancelled { .. } => true,
            ClientError::Upload(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
