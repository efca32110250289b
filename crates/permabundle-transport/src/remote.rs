//! Remote collaborators and the values exchanged with them.
//!
//! Implementations may speak HTTP, gRPC or anything else; they are expected
//! to handle their own connection-level retries. The orchestrators only
//! retry what the policy in the crate docs allows.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use permabundle_core::DataItem;
use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::RemoteError;

/// Result type for remote calls.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Opaque chunk session token issued by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// One contiguous slice of an envelope, addressed by its byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub session: SessionId,
    pub offset: u64,
    pub data: Bytes,
}

/// A tag as reported by the node, UTF-8 decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTag {
    pub name: String,
    pub value: String,
}

/// Receipt for an accepted envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub anchor: String,
    #[serde(default)]
    pub tags: Vec<TransactionTag>,
    /// Payload length, as a decimal string.
    #[serde(default)]
    pub data_size: String,
    /// Envelope length, as a decimal string.
    #[serde(default)]
    pub raw_size: String,
}

impl Transaction {
    /// Describe a signed item the way nodes report it.
    pub fn describe(item: &DataItem, raw_size: usize, currency: &str) -> Self {
        let b64 = |bytes: &[u8]| URL_SAFE_NO_PAD.encode(bytes);
        Self {
            id: item.id().map(|id| id.to_base64url()).unwrap_or_default(),
            currency: currency.to_owned(),
            address: String::new(),
            owner: item.owner().map(b64).unwrap_or_default(),
            signature: item.signature().map(b64).unwrap_or_default(),
            target: item.target().map(b64).unwrap_or_default(),
            anchor: item.anchor().map(b64).unwrap_or_default(),
            tags: item
                .tags()
                .iter()
                .map(|t| TransactionTag {
                    name: String::from_utf8_lossy(&t.name).into_owned(),
                    value: String::from_utf8_lossy(&t.value).into_owned(),
                })
                .collect(),
            data_size: item.data().len().to_string(),
            raw_size: raw_size.to_string(),
        }
    }
}

/// Reference to a submitted funding transaction, e.g. a chain tx hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FundingReference(pub String);

impl fmt::Display for FundingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the node has credited a funding transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingStatus {
    Confirmed,
    Pending,
}

/// Node identity and the addresses it accepts funding at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub version: String,
    #[serde(default)]
    pub addresses: BTreeMap<String, String>,
    #[serde(default)]
    pub gateway: String,
}

/// Chunked upload endpoint of a node.
///
/// Chunks of one session may arrive in any order and a chunk may be sent
/// more than once; the node keys them by offset.
#[async_trait]
pub trait ChunkSink: Send + Sync {
    /// Open a new chunk session.
    async fn acquire_session(&self) -> Result<SessionId>;

    /// Store one chunk.
    async fn send_chunk(&self, chunk: Chunk) -> Result<()>;

    /// Mark the session complete. Called once, after every chunk is acknowledged.
    async fn finalize(&self, session: &SessionId) -> Result<()>;

    /// Fetch the transaction produced by a finalized session.
    ///
    /// `Ok(None)` means the node has not materialized it yet.
    async fn poll_transaction(&self, session: &SessionId) -> Result<Option<Transaction>>;
}

/// Single-request upload endpoint.
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, envelope: Bytes) -> Result<Transaction>;
}

/// Account and lookup endpoints of a node.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Price of storing `bytes` bytes.
    async fn price(&self, bytes: u64) -> Result<Amount>;

    /// Current balance of the uploading account.
    async fn balance(&self) -> Result<Amount>;

    /// Tell the node about a funding transaction.
    async fn notify_funding(&self, reference: &FundingReference) -> Result<()>;

    /// Whether the node has credited a funding transaction.
    async fn funding_status(&self, reference: &FundingReference) -> Result<FundingStatus>;

    /// Look up an accepted transaction by id.
    async fn transaction(&self, id: &str) -> Result<Transaction>;

    async fn node_info(&self) -> Result<NodeInfo>;
}

/// The one ledger capability the client needs: pay `amount` to the node.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn submit_funding_transaction(&self, amount: &Amount) -> Result<FundingReference>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_json_shape() {
        let json = r#"{"id":"abc","currency":"ethereum","tags":[{"name":"a","value":"b"}],"data_size":"5"}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.id, "abc");
        assert_eq!(tx.tags[0].name, "a");
        assert_eq!(tx.data_size, "5");
        assert!(tx.owner.is_empty());
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::from("b9c3");
        assert_eq!(id.to_string(), "b9c3");
        assert_eq!(id.as_str(), "b9c3");
    }
}
