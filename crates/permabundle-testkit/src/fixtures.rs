//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use permabundle_core::{encode, DataItem, DataItemBuilder, Ed25519Signer, EthereumSigner, Tag};
use permabundle_transport::memory::{MemoryLedger, MemoryNode};
use permabundle_transport::{ChunkPolicy, UploadConfig, WorkerTier};

/// Well-known development key (hardhat account #0).
pub const ETHEREUM_DEV_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Address of [`ETHEREUM_DEV_KEY`].
pub const ETHEREUM_DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

/// A deterministic signer wired to a fresh in-memory node and ledger.
pub struct TestFixture {
    pub signer: Ed25519Signer,
    pub node: Arc<MemoryNode>,
    pub ledger: Arc<MemoryLedger>,
}

impl TestFixture {
    /// Create a new test fixture with a random signer.
    pub fn new() -> Self {
        Self::from_signer(Ed25519Signer::generate())
    }

    /// Create with a deterministic signer from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::from_signer(Ed25519Signer::from_secret_bytes(&seed))
    }

    fn from_signer(signer: Ed25519Signer) -> Self {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        Self {
            signer,
            node,
            ledger,
        }
    }

    /// Sign `payload` with the given tags.
    pub fn item(&self, payload: &[u8], tags: Vec<Tag>) -> DataItem {
        DataItemBuilder::new(payload.to_vec())
            .tags(tags)
            .sign(&self.signer)
            .expect("fixture signer signs")
    }

    /// Encoded envelope of an untagged item.
    pub fn envelope(&self, payload: &[u8]) -> Bytes {
        let item = self.item(payload, Vec::new());
        Bytes::from(encode(&item).expect("fixture item encodes"))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create multiple fixtures with distinct deterministic signers.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed)
        })
        .collect()
}

/// Signer for [`ETHEREUM_DEV_KEY`].
pub fn ethereum_signer() -> EthereumSigner {
    EthereumSigner::from_hex(ETHEREUM_DEV_KEY).expect("dev key is valid")
}

/// Chunk policy scaled down so kilobyte payloads exercise every tier.
pub fn small_chunk_policy() -> ChunkPolicy {
    ChunkPolicy {
        min_size: 1_000,
        single_worker_threshold: 2_000,
        max_chunk_size: 1_000_000,
        max_workers: 4,
        worker_tiers: vec![
            WorkerTier {
                below: 8_000,
                workers: 2,
            },
            WorkerTier {
                below: 32_000,
                workers: 3,
            },
        ],
    }
}

/// Upload config with millisecond timeouts and pauses.
pub fn fast_upload_config() -> UploadConfig {
    UploadConfig {
        chunk_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_millis(500),
        retry_backoff: Duration::from_millis(1),
        poll_interval: Duration::from_millis(1),
        ..UploadConfig::default()
    }
}

/// Deterministic, non-repeating-looking payload of `len` bytes.
pub fn payload(len: usize) -> Bytes {
    (0..len)
        .map(|i| ((i * 31 + 7) % 251) as u8)
        .collect::<Vec<_>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use permabundle_core::{decode, verify, Signer};

    #[test]
    fn test_fixture_envelope_verifies() {
        let fixture = TestFixture::with_seed([9; 32]);
        let envelope = fixture.envelope(b"fixture");
        let item = decode(&envelope).unwrap();
        verify(&item).unwrap();
        assert_eq!(item.owner(), Some(fixture.signer.owner()));
    }

    #[test]
    fn test_multi_party() {
        let parties = multi_party_fixtures(3);
        let owners: Vec<_> = parties.iter().map(|p| p.signer.owner().to_vec()).collect();
        assert_ne!(owners[0], owners[1]);
        assert_ne!(owners[1], owners[2]);
        assert_ne!(owners[0], owners[2]);
    }

    #[test]
    fn test_ethereum_dev_signer() {
        assert_eq!(ethereum_signer().address(), ETHEREUM_DEV_ADDRESS);
    }

    #[test]
    fn test_small_policy_is_valid() {
        let policy = small_chunk_policy();
        policy.validate().unwrap();
        assert_eq!(policy.plan(1_500).unwrap().workers, 1);
        assert_eq!(policy.plan(5_000).unwrap().workers, 2);
        assert_eq!(policy.plan(20_000).unwrap().workers, 3);
        assert_eq!(policy.plan(40_000).unwrap().workers, 4);
    }

    #[tokio::test]
    async fn test_fixture_node_accepts_envelope() {
        use permabundle_transport::Submitter;

        let fixture = TestFixture::new();
        let tx = fixture
            .node
            .submit(fixture.envelope(b"stored"))
            .await
            .unwrap();
        assert!(fixture.node.stored(&tx.id).await.is_some());
    }

    #[test]
    fn test_payload_is_deterministic() {
        assert_eq!(payload(64), payload(64));
        assert_eq!(payload(3).as_ref(), &[7, 38, 69]);
    }
}
