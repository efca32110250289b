//! In-memory node and ledger for tests and demos.
//!
//! [`MemoryNode`] implements every remote trait. It assembles finalized chunk
//! sessions, decodes and verifies the envelope like a real node would, charges
//! the account and records an event log. Faults are scripted per chunk
//! offset, per call or per funding step.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use permabundle_core::{decode_shared, verify};
use tokio::sync::Mutex;

use crate::amount::Amount;
use crate::error::RemoteError;
use crate::remote::{
    AccountService, Chunk, ChunkSink, FundingReference, FundingStatus, Ledger, NodeInfo, Result,
    SessionId, Submitter, Transaction,
};

const CURRENCY: &str = "memory";

/// A scripted outcome for one send of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFault {
    /// Return this error.
    Fail(RemoteError),
    /// Hang for this long, then accept the chunk.
    Stall(Duration),
}

/// Everything the node observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    SessionAcquired(SessionId),
    ChunkStored {
        session: SessionId,
        offset: u64,
        len: usize,
    },
    ChunkRejected {
        session: SessionId,
        offset: u64,
        error: RemoteError,
    },
    Finalized(SessionId),
    Submitted {
        id: String,
        len: usize,
    },
    PriceQuoted {
        bytes: u64,
        price: Amount,
    },
    BalanceQueried(Amount),
    FundingNotified(FundingReference),
    FundingStatusQueried(FundingReference, FundingStatus),
}

#[derive(Default)]
struct Session {
    chunks: BTreeMap<u64, Bytes>,
    /// Transaction id once finalized.
    transaction: Option<String>,
    polls_remaining: u32,
}

#[derive(Debug, Clone)]
struct Funding {
    amount: Amount,
    notified: bool,
    credited: bool,
}

#[derive(Default)]
struct NodeState {
    sessions: HashMap<SessionId, Session>,
    stored: HashMap<String, (Bytes, Transaction)>,
    events: Vec<NodeEvent>,

    balance: Amount,
    /// Balance reported instead of the real one, for the given number of reads.
    stale_balance: Option<(Amount, u32)>,
    base_price: Amount,
    price_per_byte: Amount,
    fundings: HashMap<FundingReference, Funding>,

    chunk_faults: HashMap<u64, VecDeque<ChunkFault>>,
    chunk_attempts: HashMap<u64, u32>,
    finalize_fault: Option<RemoteError>,
    finalize_count: usize,
    polls_until_ready: u32,
    confirms_funding: bool,
    balance_lag: u32,
    balance_faults: VecDeque<RemoteError>,
}

/// An in-process node.
pub struct MemoryNode {
    state: Mutex<NodeState>,
    next_session: AtomicU64,
}

impl MemoryNode {
    /// A free node (price zero) that confirms funding immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(NodeState {
                confirms_funding: true,
                ..NodeState::default()
            }),
            next_session: AtomicU64::new(1),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scripting
    // ─────────────────────────────────────────────────────────────────────────

    /// Queue outcomes for successive sends of the chunk at `offset`.
    pub async fn script_chunk(&self, offset: u64, faults: Vec<ChunkFault>) {
        self.state
            .lock()
            .await
            .chunk_faults
            .entry(offset)
            .or_default()
            .extend(faults);
    }

    /// Fail the next finalize call.
    pub async fn fail_finalize(&self, error: RemoteError) {
        self.state.lock().await.finalize_fault = Some(error);
    }

    /// Report "not ready" this many times after each finalize.
    pub async fn set_polls_until_ready(&self, polls: u32) {
        self.state.lock().await.polls_until_ready = polls;
    }

    pub async fn set_balance(&self, balance: Amount) {
        self.state.lock().await.balance = balance;
    }

    /// Price is `base + per_byte * bytes`.
    pub async fn set_pricing(&self, base: Amount, per_byte: Amount) {
        let mut state = self.state.lock().await;
        state.base_price = base;
        state.price_per_byte = per_byte;
    }

    /// Whether notified funding is credited, or left pending forever.
    pub async fn set_confirms_funding(&self, confirms: bool) {
        self.state.lock().await.confirms_funding = confirms;
    }

    /// After crediting funding, keep reporting the old balance for `reads` reads.
    pub async fn set_balance_lag(&self, reads: u32) {
        self.state.lock().await.balance_lag = reads;
    }

    /// Fail the next balance reads with these errors, in order.
    pub async fn script_balance_errors(&self, errors: Vec<RemoteError>) {
        self.state.lock().await.balance_faults.extend(errors);
    }

    /// Make a funding transaction visible to the node, as a chain would.
    pub async fn register_funding(&self, reference: FundingReference, amount: Amount) {
        self.state.lock().await.fundings.insert(
            reference,
            Funding {
                amount,
                notified: false,
                credited: false,
            },
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn events(&self) -> Vec<NodeEvent> {
        self.state.lock().await.events.clone()
    }

    /// Envelope bytes accepted under transaction `id`.
    pub async fn stored(&self, id: &str) -> Option<Bytes> {
        self.state
            .lock()
            .await
            .stored
            .get(id)
            .map(|(bytes, _)| bytes.clone())
    }

    pub async fn stored_count(&self) -> usize {
        self.state.lock().await.stored.len()
    }

    /// Sends of the chunk at `offset` across all sessions, faulted ones included.
    pub async fn chunk_attempts(&self, offset: u64) -> u32 {
        self.state
            .lock()
            .await
            .chunk_attempts
            .get(&offset)
            .copied()
            .unwrap_or(0)
    }

    pub async fn finalize_count(&self) -> usize {
        self.state.lock().await.finalize_count
    }

    pub async fn current_balance(&self) -> Amount {
        self.state.lock().await.balance.clone()
    }
}

impl NodeState {
    fn quote(&self, bytes: u64) -> Amount {
        let per_byte = self.price_per_byte.as_biguint() * bytes;
        &self.base_price + &Amount::from_biguint(per_byte)
    }

    /// Decode, verify, charge and store an envelope.
    fn accept(&mut self, envelope: Bytes) -> Result<Transaction> {
        let len = envelope.len();
        let item = decode_shared(envelope.clone()).map_err(|e| RemoteError::Status {
            status: 400,
            message: e.to_string(),
        })?;
        verify(&item).map_err(|e| RemoteError::Status {
            status: 400,
            message: e.to_string(),
        })?;

        let price = self.quote(len as u64);
        if self.balance < price {
            return Err(RemoteError::InsufficientFunds(format!(
                "price {} exceeds balance {}",
                price, self.balance
            )));
        }
        self.balance = self.balance.saturating_sub(&price);

        let tx = Transaction::describe(&item, len, CURRENCY);
        self.stored
            .insert(tx.id.clone(), (envelope, tx.clone()));
        self.events.push(NodeEvent::Submitted {
            id: tx.id.clone(),
            len,
        });
        Ok(tx)
    }
}

/// Concatenate chunks keyed by offset, requiring an exact tiling from zero.
fn assemble(chunks: &BTreeMap<u64, Bytes>) -> Result<Bytes> {
    let mut out = BytesMut::new();
    for (offset, data) in chunks {
        if *offset != out.len() as u64 {
            return Err(RemoteError::Status {
                status: 400,
                message: format!("chunk gap or overlap at offset {}", offset),
            });
        }
        out.extend_from_slice(data);
    }
    Ok(out.freeze())
}

#[async_trait]
impl ChunkSink for MemoryNode {
    async fn acquire_session(&self) -> Result<SessionId> {
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session = SessionId::new(format!("session-{:04}", n));
        let mut state = self.state.lock().await;
        state.sessions.insert(session.clone(), Session::default());
        state.events.push(NodeEvent::SessionAcquired(session.clone()));
        Ok(session)
    }

    async fn send_chunk(&self, chunk: Chunk) -> Result<()> {
        let fault = {
            let mut state = self.state.lock().await;
            if !state.sessions.contains_key(&chunk.session) {
                return Err(RemoteError::NotFound(format!("session {}", chunk.session)));
            }
            *state.chunk_attempts.entry(chunk.offset).or_insert(0) += 1;
            state
                .chunk_faults
                .get_mut(&chunk.offset)
                .and_then(VecDeque::pop_front)
        };

        match fault {
            Some(ChunkFault::Fail(error)) => {
                self.state.lock().await.events.push(NodeEvent::ChunkRejected {
                    session: chunk.session,
                    offset: chunk.offset,
                    error: error.clone(),
                });
                return Err(error);
            }
            Some(ChunkFault::Stall(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }

        let mut state = self.state.lock().await;
        let len = chunk.data.len();
        if let Some(session) = state.sessions.get_mut(&chunk.session) {
            session.chunks.insert(chunk.offset, chunk.data);
        }
        state.events.push(NodeEvent::ChunkStored {
            session: chunk.session,
            offset: chunk.offset,
            len,
        });
        Ok(())
    }

    async fn finalize(&self, session_id: &SessionId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.finalize_count += 1;
        if let Some(error) = state.finalize_fault.take() {
            return Err(error);
        }

        let polls = state.polls_until_ready;
        let envelope = {
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| RemoteError::NotFound(format!("session {}", session_id)))?;
            assemble(&session.chunks)?
        };
        let tx = state.accept(envelope)?;

        if let Some(session) = state.sessions.get_mut(session_id) {
            session.transaction = Some(tx.id);
            session.polls_remaining = polls;
        }
        state.events.push(NodeEvent::Finalized(session_id.clone()));
        Ok(())
    }

    async fn poll_transaction(&self, session_id: &SessionId) -> Result<Option<Transaction>> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RemoteError::NotFound(format!("session {}", session_id)))?;

        let Some(id) = session.transaction.clone() else {
            return Ok(None);
        };
        if session.polls_remaining > 0 {
            session.polls_remaining -= 1;
            return Ok(None);
        }
        Ok(state.stored.get(&id).map(|(_, tx)| tx.clone()))
    }
}

#[async_trait]
impl Submitter for MemoryNode {
    async fn submit(&self, envelope: Bytes) -> Result<Transaction> {
        self.state.lock().await.accept(envelope)
    }
}

#[async_trait]
impl AccountService for MemoryNode {
    async fn price(&self, bytes: u64) -> Result<Amount> {
        let mut state = self.state.lock().await;
        let price = state.quote(bytes);
        state.events.push(NodeEvent::PriceQuoted {
            bytes,
            price: price.clone(),
        });
        Ok(price)
    }

    async fn balance(&self) -> Result<Amount> {
        let mut state = self.state.lock().await;
        if let Some(error) = state.balance_faults.pop_front() {
            return Err(error);
        }

        let reported = match state.stale_balance.take() {
            Some((stale, reads)) if reads > 0 => {
                if reads > 1 {
                    state.stale_balance = Some((stale.clone(), reads - 1));
                }
                stale
            }
            _ => state.balance.clone(),
        };
        state.events.push(NodeEvent::BalanceQueried(reported.clone()));
        Ok(reported)
    }

    async fn notify_funding(&self, reference: &FundingReference) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let confirms = state.confirms_funding;
        let funding = state
            .fundings
            .get_mut(reference)
            .ok_or_else(|| RemoteError::NotFound(format!("funding {}", reference)))?;
        funding.notified = true;

        if confirms && !funding.credited {
            funding.credited = true;
            let amount = funding.amount.clone();
            let previous = state.balance.clone();
            state.balance = &previous + &amount;
            if state.balance_lag > 0 {
                state.stale_balance = Some((previous, state.balance_lag));
            }
        }
        state.events.push(NodeEvent::FundingNotified(reference.clone()));
        Ok(())
    }

    async fn funding_status(&self, reference: &FundingReference) -> Result<FundingStatus> {
        let mut state = self.state.lock().await;
        let funding = state
            .fundings
            .get(reference)
            .filter(|f| f.notified)
            .ok_or_else(|| RemoteError::NotFound(format!("funding {}", reference)))?;
        let status = if funding.credited {
            FundingStatus::Confirmed
        } else {
            FundingStatus::Pending
        };
        state
            .events
            .push(NodeEvent::FundingStatusQueried(reference.clone(), status));
        Ok(status)
    }

    async fn transaction(&self, id: &str) -> Result<Transaction> {
        self.state
            .lock()
            .await
            .stored
            .get(id)
            .map(|(_, tx)| tx.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("transaction {}", id)))
    }

    async fn node_info(&self) -> Result<NodeInfo> {
        Ok(NodeInfo {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            addresses: BTreeMap::from([(CURRENCY.to_owned(), "memory-node".to_owned())]),
            gateway: "localhost".to_owned(),
        })
    }
}

/// A ledger whose transfers land on a [`MemoryNode`].
pub struct MemoryLedger {
    node: Arc<MemoryNode>,
    submissions: Mutex<Vec<Amount>>,
    next_failure: Mutex<Option<RemoteError>>,
    counter: AtomicU64,
}

impl MemoryLedger {
    pub fn new(node: Arc<MemoryNode>) -> Arc<Self> {
        Arc::new(Self {
            node,
            submissions: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
            counter: AtomicU64::new(1),
        })
    }

    /// Amounts of every funding transaction submitted so far.
    pub async fn submissions(&self) -> Vec<Amount> {
        self.submissions.lock().await.clone()
    }

    /// Fail the next submission.
    pub async fn fail_next(&self, error: RemoteError) {
        *self.next_failure.lock().await = Some(error);
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn submit_funding_transaction(&self, amount: &Amount) -> Result<FundingReference> {
        if let Some(error) = self.next_failure.lock().await.take() {
            return Err(error);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let reference = FundingReference(format!("0x{:064x}", n));
        self.submissions.lock().await.push(amount.clone());
        self.node
            .register_funding(reference.clone(), amount.clone())
            .await;
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permabundle_core::{encode, DataItemBuilder, Ed25519Signer};

    fn envelope() -> Bytes {
        let signer = Ed25519Signer::from_secret_bytes(&[8u8; 32]);
        let item = DataItemBuilder::new(&b"memory node"[..]).sign(&signer).unwrap();
        Bytes::from(encode(&item).unwrap())
    }

    #[tokio::test]
    async fn test_single_shot_submit() {
        let node = MemoryNode::new();
        let env = envelope();
        let tx = node.submit(env.clone()).await.unwrap();
        assert_eq!(node.stored(&tx.id).await.unwrap(), env);
        assert_eq!(node.transaction(&tx.id).await.unwrap(), tx);
    }

    #[tokio::test]
    async fn test_rejects_corrupt_envelope() {
        let node = MemoryNode::new();
        let mut env = envelope().to_vec();
        let last = env.len() - 1;
        env[last] ^= 1;
        let err = node.submit(Bytes::from(env)).await.unwrap_err();
        assert!(matches!(err, RemoteError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_charges_price() {
        let node = MemoryNode::new();
        node.set_pricing(Amount::from(10u64), Amount::zero()).await;

        let err = node.submit(envelope()).await.unwrap_err();
        assert!(matches!(err, RemoteError::InsufficientFunds(_)));

        node.set_balance(Amount::from(25u64)).await;
        node.submit(envelope()).await.unwrap();
        assert_eq!(node.current_balance().await, Amount::from(15u64));
    }

    #[tokio::test]
    async fn test_chunks_out_of_order() {
        let node = MemoryNode::new();
        let env = envelope();
        let session = node.acquire_session().await.unwrap();
        let mid = env.len() / 2;

        for (offset, data) in [(mid, env.slice(mid..)), (0, env.slice(..mid))] {
            node.send_chunk(Chunk {
                session: session.clone(),
                offset: offset as u64,
                data,
            })
            .await
            .unwrap();
        }
        node.finalize(&session).await.unwrap();
        let tx = node.poll_transaction(&session).await.unwrap().unwrap();
        assert_eq!(node.stored(&tx.id).await.unwrap(), env);
    }

    #[tokio::test]
    async fn test_gap_rejected_at_finalize() {
        let node = MemoryNode::new();
        let env = envelope();
        let session = node.acquire_session().await.unwrap();
        node.send_chunk(Chunk {
            session: session.clone(),
            offset: 10,
            data: env.slice(10..),
        })
        .await
        .unwrap();
        assert!(node.finalize(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_funding_flow() {
        let node = MemoryNode::new();
        let ledger = MemoryLedger::new(node.clone());
        node.set_balance_lag(1).await;

        let reference = ledger
            .submit_funding_transaction(&Amount::from(50u64))
            .await
            .unwrap();
        node.notify_funding(&reference).await.unwrap();
        assert_eq!(
            node.funding_status(&reference).await.unwrap(),
            FundingStatus::Confirmed
        );

        assert_eq!(node.balance().await.unwrap(), Amount::zero());
        assert_eq!(node.balance().await.unwrap(), Amount::from(50u64));
        assert_eq!(ledger.submissions().await, vec![Amount::from(50u64)]);
    }

    #[tokio::test]
    async fn test_unknown_funding_reference() {
        let node = MemoryNode::new();
        let reference = FundingReference("0xdead".into());
        assert!(matches!(
            node.notify_funding(&reference).await,
            Err(RemoteError::NotFound(_))
        ));
    }
}
