//! Strong type definitions for Permabundle.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::Sha256Hash;

/// A 32-byte data item identifier, computed as SHA-256(signature).
///
/// The id is never trusted from the wire: it is always recomputed from the
/// signature bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataItemId(pub [u8; 32]);

impl DataItemId {
    /// Derive the id of a signature.
    pub fn from_signature(signature: &[u8]) -> Self {
        Self(Sha256Hash::hash(signature).0)
    }

    /// Create a new DataItemId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Unpadded base64url, the network's textual id format.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    /// Parse from unpadded base64url.
    pub fn from_base64url(s: &str) -> Result<Self, base64::DecodeError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| base64::DecodeError::InvalidLength(s.len()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for DataItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataItemId({})", self.to_base64url())
    }
}

impl fmt::Display for DataItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl AsRef<[u8]> for DataItemId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for DataItemId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for DataItemId {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}
