//! Error types for Permabundle Core.

use std::fmt;

use thiserror::Error;

use crate::signer::SignatureType;

/// Errors raised while building, signing, encoding or decoding data items.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("data item is not signed")]
    NotSigned,

    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(u16),

    #[error("truncated {field}: needed {needed} bytes, {available} available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("anchor must be absent or 32 bytes, got {0}")]
    BadAnchorLength(usize),

    #[error("target must be absent or 32 bytes, got {0}")]
    BadTargetLength(usize),

    #[error("malformed tags: {0}")]
    MalformedTags(String),

    #[error("malformed data item: {0}")]
    MalformedItem(String),

    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
}

/// Errors raised by signature schemes.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(u16),

    #[error("{0} signer holds no private key")]
    NotSigningCapable(SignatureType),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("signature does not match")]
    SignatureMismatch,

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Which half of a tag violated a limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
    Name,
    Value,
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagField::Name => f.write_str("name"),
            TagField::Value => f.write_str("value"),
        }
    }
}

/// Verification failures for a signed data item.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("data item is not signed")]
    NotSigned,

    #[error("id is not the hash of the signature")]
    IdMismatch,

    #[error("anchor must be absent or 32 bytes, got {0}")]
    BadAnchorLength(usize),

    #[error("target must be absent or 32 bytes, got {0}")]
    BadTargetLength(usize),

    #[error("too many tags: {count} exceeds maximum of {max}")]
    TooManyTags { count: usize, max: usize },

    #[error("tag {index} has an empty {field}")]
    EmptyTag { index: usize, field: TagField },

    #[error("tag {index} {field} is {len} bytes, maximum is {max}")]
    TagTooLong {
        index: usize,
        field: TagField,
        len: usize,
        max: usize,
    },

    #[error("serialized tags are {len} bytes, maximum is {max}")]
    TagBytesTooLarge { len: usize, max: usize },

    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(u16),

    #[error("invalid owner: {0}")]
    InvalidOwner(String),

    #[error("signature verification failed")]
    SignatureMismatch,
}

impl From<SignerError> for ValidationError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::UnsupportedScheme(id) => ValidationError::UnsupportedScheme(id),
            SignerError::InvalidKey(msg) => ValidationError::InvalidOwner(msg),
            SignerError::SignatureMismatch
            | SignerError::InvalidSignature(_)
            | SignerError::NotSigningCapable(_)
            | SignerError::SigningFailed(_) => ValidationError::SignatureMismatch,
        }
    }
}
