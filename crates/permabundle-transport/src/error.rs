//! Error types for the transport layer.

use std::fmt;

use permabundle_core::CoreError;
use thiserror::Error;

use crate::remote::SessionId;

/// Errors reported by a remote collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The request did not complete in time. The only retryable kind.
    #[error("request timed out")]
    Timeout,

    /// Non-success status from the remote side.
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The account cannot pay for the request.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Unknown session, transaction or reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteError::Timeout)
    }
}

/// Chunk planning rejections. Raised before any network call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("envelope of {len} bytes is below the chunking minimum of {min}; submit it in one request")]
    PayloadTooSmallToChunk { len: usize, min: usize },

    #[error("chunk size {chunk_size} exceeds the maximum of {max}")]
    ChunkTooLarge { chunk_size: usize, max: usize },

    #[error("invalid chunk policy: {0}")]
    InvalidPolicy(String),
}

/// Stages of a chunked upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    Planning,
    SessionAcquired,
    Streaming,
    Finalizing,
    Polling,
    Done,
    Aborted,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadStage::Planning => "planning",
            UploadStage::SessionAcquired => "session-acquired",
            UploadStage::Streaming => "streaming",
            UploadStage::Finalizing => "finalizing",
            UploadStage::Polling => "polling",
            UploadStage::Done => "done",
            UploadStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Errors from an upload. Exactly one is reported per failed upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("planning failed: {0}")]
    Plan(#[from] PlanError),

    #[error("envelope error: {0}")]
    Codec(#[from] CoreError),

    /// A chunk send failed with a non-timeout error or ran out of attempts.
    #[error("chunk {index} at offset {offset} failed after {attempts} attempt(s): {source}")]
    Chunk {
        index: usize,
        offset: u64,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    /// A session-level remote call failed.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: UploadStage,
        #[source]
        source: RemoteError,
    },

    #[error("upload cancelled during {stage}")]
    Cancelled { stage: UploadStage },

    #[error("transaction for session {session} not ready after {attempts} poll(s)")]
    TransactionNotReady { session: SessionId, attempts: u32 },

    /// A worker task ended abnormally.
    #[error("worker failure: {0}")]
    Worker(String),
}

impl UploadError {
    /// Stage the upload was in when it failed.
    pub fn stage(&self) -> UploadStage {
        match self {
            UploadError::Plan(_) | UploadError::Codec(_) => UploadStage::Planning,
            UploadError::Chunk { .. } | UploadError::Worker(_) => UploadStage::Streaming,
            UploadError::Stage { stage, .. } | UploadError::Cancelled { stage } => *stage,
            UploadError::TransactionNotReady { .. } => UploadStage::Polling,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled { .. })
    }
}

/// Result type for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;
