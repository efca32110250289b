//! Upload orchestrator: concurrent chunked upload of one signed envelope.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info, info_span, warn, Instrument, Span};

use crate::error::{RemoteError, Result, UploadError, UploadStage};
use crate::planner::{ChunkPlan, ChunkPolicy};
use crate::remote::{Chunk, ChunkSink, SessionId, Transaction};

/// Configuration for chunked uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Total send attempts per chunk, counting the first.
    pub max_chunk_attempts: u32,
    /// Deadline for one chunk send. Expiry counts as a timeout.
    #[serde(rename = "chunk_timeout_ms", with = "crate::serde_ms")]
    pub chunk_timeout: Duration,
    /// Deadline for session, finalize and poll calls.
    #[serde(rename = "request_timeout_ms", with = "crate::serde_ms")]
    pub request_timeout: Duration,
    /// Pause before retrying a timed-out chunk.
    #[serde(rename = "retry_backoff_ms", with = "crate::serde_ms")]
    pub retry_backoff: Duration,
    /// Transaction fetch attempts after finalize.
    pub poll_attempts: u32,
    #[serde(rename = "poll_interval_ms", with = "crate::serde_ms")]
    pub poll_interval: Duration,
    /// Job queue capacity. Defaults to the worker count.
    pub job_queue_depth: Option<usize>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_chunk_attempts: 3,
            chunk_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(200),
            poll_attempts: 3,
            poll_interval: Duration::from_secs(1),
            job_queue_depth: None,
        }
    }
}

/// Drives chunk sessions against a [`ChunkSink`].
pub struct UploadOrchestrator {
    sink: Arc<dyn ChunkSink>,
    policy: ChunkPolicy,
    config: UploadConfig,
}

/// One chunk waiting to be sent.
#[derive(Debug, Clone)]
struct ChunkJob {
    index: usize,
    offset: u64,
    data: Bytes,
}

/// A chunk that could not be delivered. Stored in the first-error cell.
#[derive(Debug, Clone)]
struct ChunkFailure {
    index: usize,
    offset: u64,
    attempts: u32,
    source: RemoteError,
}

impl From<ChunkFailure> for UploadError {
    fn from(f: ChunkFailure) -> Self {
        UploadError::Chunk {
            index: f.index,
            offset: f.offset,
            attempts: f.attempts,
            source: f.source,
        }
    }
}

/// State shared by the workers of one upload.
struct Shared {
    sink: Arc<dyn ChunkSink>,
    config: UploadConfig,
    session: SessionId,
    jobs: Mutex<mpsc::Receiver<ChunkJob>>,
    /// Set once by the first failing worker.
    first_error: OnceLock<ChunkFailure>,
    acknowledged: AtomicUsize,
    abort: CancellationToken,
}

impl UploadOrchestrator {
    pub fn new(sink: Arc<dyn ChunkSink>, policy: ChunkPolicy, config: UploadConfig) -> Self {
        Self {
            sink,
            policy,
            config,
        }
    }

    pub fn policy(&self) -> &ChunkPolicy {
        &self.policy
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Upload a signed envelope in chunks and return the node's transaction.
    ///
    /// With `resume`, the given session is reused instead of acquiring a new
    /// one. Every chunk is still sent.
    pub async fn upload(
        &self,
        envelope: Bytes,
        resume: Option<SessionId>,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let plan = self.policy.plan(envelope.len())?;
        let span = info_span!(
            "chunked_upload",
            envelope_len = envelope.len(),
            workers = plan.workers,
            chunk_size = plan.chunk_size,
            session = field::Empty,
        );

        let result = self
            .run(plan, envelope, resume, cancel)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(tx) => info!(stage = %UploadStage::Done, id = %tx.id, "upload complete"),
            Err(e) => warn!(stage = %UploadStage::Aborted, failed_in = %e.stage(), error = %e, "upload aborted"),
        });
        result
    }

    async fn run(
        &self,
        plan: ChunkPlan,
        envelope: Bytes,
        resume: Option<SessionId>,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        debug!(stage = %UploadStage::Planning, chunks = plan.chunk_count(), "planned");

        let session = match resume {
            Some(session) => {
                info!(stage = %UploadStage::SessionAcquired, %session, "resuming session");
                session
            }
            None => {
                let session = self
                    .call(UploadStage::SessionAcquired, cancel, self.sink.acquire_session())
                    .await?;
                info!(stage = %UploadStage::SessionAcquired, %session, "session acquired");
                session
            }
        };
        Span::current().record("session", field::display(&session));

        self.stream(&plan, &envelope, &session, cancel).await?;

        self.call(UploadStage::Finalizing, cancel, self.sink.finalize(&session))
            .await?;
        info!(stage = %UploadStage::Finalizing, "session finalized");

        self.poll(&session, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────────────────────────────────────

    async fn stream(
        &self,
        plan: &ChunkPlan,
        envelope: &Bytes,
        session: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let jobs: Vec<ChunkJob> = plan
            .ranges()
            .enumerate()
            .map(|(index, range)| ChunkJob {
                index,
                offset: range.start as u64,
                data: envelope.slice(range),
            })
            .collect();
        let total = jobs.len();
        let workers = plan.workers.clamp(1, total.max(1));
        let depth = self.config.job_queue_depth.unwrap_or(workers).max(1);

        info!(stage = %UploadStage::Streaming, chunks = total, workers, "streaming chunks");

        let (tx, rx) = mpsc::channel(depth);
        let shared = Arc::new(Shared {
            sink: Arc::clone(&self.sink),
            config: self.config.clone(),
            session: session.clone(),
            jobs: Mutex::new(rx),
            first_error: OnceLock::new(),
            acknowledged: AtomicUsize::new(0),
            abort: cancel.child_token(),
        });

        let mut pool = JoinSet::new();
        for worker in 0..workers {
            let shared = Arc::clone(&shared);
            pool.spawn(run_worker(worker, shared).instrument(Span::current()));
        }

        // Dispatch in ascending offset order; stop as soon as anything aborts.
        for job in jobs {
            tokio::select! {
                biased;
                _ = shared.abort.cancelled() => break,
                sent = tx.send(job) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        drop(tx);

        let mut panicked = None;
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                shared.abort.cancel();
                panicked.get_or_insert_with(|| e.to_string());
            }
        }

        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled {
                stage: UploadStage::Streaming,
            });
        }
        if let Some(failure) = shared.first_error.get() {
            return Err(failure.clone().into());
        }
        if let Some(message) = panicked {
            return Err(UploadError::Worker(message));
        }

        let acknowledged = shared.acknowledged.load(Ordering::SeqCst);
        if acknowledged != total {
            return Err(UploadError::Worker(format!(
                "{} of {} chunks acknowledged",
                acknowledged, total
            )));
        }
        debug!(chunks = total, "all chunks acknowledged");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one session-level remote call under the request deadline and `cancel`.
    async fn call<T>(
        &self,
        stage: UploadStage,
        cancel: &CancellationToken,
        call: impl Future<Output = std::result::Result<T, RemoteError>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UploadError::Cancelled { stage }),
            outcome = tokio::time::timeout(self.config.request_timeout, call) => {
                let source = match outcome {
                    Ok(Ok(value)) => return Ok(value),
                    Ok(Err(source)) => source,
                    Err(_) => RemoteError::Timeout,
                };
                Err(UploadError::Stage { stage, source })
            }
        }
    }

    async fn poll(&self, session: &SessionId, cancel: &CancellationToken) -> Result<Transaction> {
        let attempts = self.config.poll_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .call(UploadStage::Polling, cancel, self.sink.poll_transaction(session))
                .await
            {
                Ok(Some(tx)) => return Ok(tx),
                Ok(None) => debug!(attempt, "transaction not ready"),
                Err(UploadError::Stage { source, .. }) if source.is_timeout() => {
                    warn!(attempt, "transaction poll timed out")
                }
                Err(e) => return Err(e),
            }

            if attempt < attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(UploadError::Cancelled { stage: UploadStage::Polling });
                    }
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        Err(UploadError::TransactionNotReady {
            session: session.clone(),
            attempts,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Workers
// ─────────────────────────────────────────────────────────────────────────────

async fn run_worker(worker: usize, shared: Arc<Shared>) {
    loop {
        let job = {
            let mut jobs = shared.jobs.lock().await;
            tokio::select! {
                biased;
                _ = shared.abort.cancelled() => return,
                job = jobs.recv() => job,
            }
        };
        let Some(job) = job else {
            return;
        };

        match send_with_retry(worker, &shared, &job).await {
            Ok(()) => {
                shared.acknowledged.fetch_add(1, Ordering::SeqCst);
            }
            Err(Some(failure)) => {
                if shared.first_error.set(failure).is_ok() {
                    warn!(worker, index = job.index, offset = job.offset, "chunk failed, aborting upload");
                }
                shared.abort.cancel();
                return;
            }
            Err(None) => return,
        }
    }
}

/// Send one chunk, retrying timeouts. `Err(None)` means the upload was aborted.
async fn send_with_retry(
    worker: usize,
    shared: &Shared,
    job: &ChunkJob,
) -> std::result::Result<(), Option<ChunkFailure>> {
    let max_attempts = shared.config.max_chunk_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        let chunk = Chunk {
            session: shared.session.clone(),
            offset: job.offset,
            data: job.data.clone(),
        };

        let outcome = tokio::select! {
            biased;
            _ = shared.abort.cancelled() => return Err(None),
            sent = tokio::time::timeout(shared.config.chunk_timeout, shared.sink.send_chunk(chunk)) => {
                sent.unwrap_or(Err(RemoteError::Timeout))
            }
        };

        match outcome {
            Ok(()) => {
                debug!(worker, index = job.index, offset = job.offset, len = job.data.len(), attempts, "chunk acknowledged");
                return Ok(());
            }
            Err(e) if e.is_timeout() && attempts < max_attempts => {
                warn!(
                    worker,
                    index = job.index,
                    attempt = attempts,
                    max_attempts,
                    "chunk send timed out, retrying"
                );
                tokio::select! {
                    biased;
                    _ = shared.abort.cancelled() => return Err(None),
                    _ = tokio::time::sleep(shared.config.retry_backoff) => {}
                }
            }
            Err(source) => {
                return Err(Some(ChunkFailure {
                    index: job.index,
                    offset: job.offset,
                    attempts,
                    source,
                }))
            }
        }
    }
}
