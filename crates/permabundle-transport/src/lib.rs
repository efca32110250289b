//! # Permabundle Transport
//!
//! Moves signed envelopes to a remote node.
//!
//! ## Overview
//!
//! Small envelopes go out in one request through a [`Submitter`]. Large ones
//! are split by the [`ChunkPlanner`](planner) and streamed concurrently by the
//! [`UploadOrchestrator`] through a [`ChunkSink`]:
//!
//! ```text
//! Planning -> SessionAcquired -> Streaming -> Finalizing -> Polling -> Done
//!     \____________\________________\____________\____________\--> Aborted
//! ```
//!
//! The remote side is reached only through the traits in [`remote`]; an
//! in-memory implementation lives in [`memory`] for tests and demos.
//!
//! ## Retry policy
//!
//! - Chunk sends that time out are retried up to a bounded attempt count.
//! - Any other chunk failure aborts the whole upload; the first error wins.
//! - Transaction polling retries "not ready" and timeouts a few times.
//! - Cancellation is observed at every remote call and wins over retries.

pub mod amount;
pub mod chunked;
pub mod error;
pub mod memory;
pub mod planner;
pub mod remote;
pub mod serde_ms;

pub use amount::Amount;
pub use chunked::{UploadConfig, UploadOrchestrator};
pub use error::{PlanError, RemoteError, UploadError, UploadStage};
pub use planner::{ChunkPlan, ChunkPolicy, WorkerTier};
pub use remote::{
    AccountService, Chunk, ChunkSink, FundingReference, FundingStatus, Ledger, NodeInfo,
    SessionId, Submitter, Transaction, TransactionTag,
};
pub use tokio_util::sync::CancellationToken;
