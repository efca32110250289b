//! The uploader: the unified entry point tying signing, funding and transport.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use permabundle_core::{decode_shared, encode, verify, DataItem, DataItemBuilder, Signer, Tag};
use permabundle_transport::{
    AccountService, Amount, CancellationToken, ChunkSink, FundingReference, Ledger, NodeInfo,
    RemoteError, SessionId, Submitter, Transaction, UploadOrchestrator,
};
use tracing::{debug, info, info_span, Instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::funding::{guarded, FundingOrchestrator, FundingOutcome, TopUpConfirmation};

/// Result of a funded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The node accepted the envelope.
    Uploaded {
        transaction: Transaction,
        /// The top-up made for this upload, if one was needed.
        funding: Option<FundingReference>,
    },
    /// A top-up was submitted but not yet credited; nothing was uploaded.
    FundingPending {
        reference: FundingReference,
        price: Amount,
        balance: Amount,
    },
}

impl UploadOutcome {
    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            UploadOutcome::Uploaded { transaction, .. } => Some(transaction),
            UploadOutcome::FundingPending { .. } => None,
        }
    }
}

/// Per-upload envelope options.
#[derive(Debug, Clone, Default)]
pub struct ItemOptions {
    pub target: Option<[u8; 32]>,
    pub anchor: Option<[u8; 32]>,
    /// Attach a random anchor when `anchor` is unset, whatever the config says.
    pub random_anchor: bool,
}

/// Signs payloads and moves them to a node.
///
/// Envelopes below the chunking minimum go out in one request; larger ones
/// are streamed by the [`UploadOrchestrator`].
pub struct Uploader {
    signer: Arc<dyn Signer>,
    submitter: Arc<dyn Submitter>,
    account: Arc<dyn AccountService>,
    ledger: Option<Arc<dyn Ledger>>,
    chunked: UploadOrchestrator,
    config: ClientConfig,
}

/// Builder for [`Uploader`].
pub struct UploaderBuilder {
    signer: Arc<dyn Signer>,
    sink: Option<Arc<dyn ChunkSink>>,
    submitter: Option<Arc<dyn Submitter>>,
    account: Option<Arc<dyn AccountService>>,
    ledger: Option<Arc<dyn Ledger>>,
    config: ClientConfig,
}

impl UploaderBuilder {
    /// Use one node for chunked uploads, single uploads and account calls.
    pub fn node<N>(mut self, node: Arc<N>) -> Self
    where
        N: ChunkSink + Submitter + AccountService + 'static,
    {
        self.sink = Some(node.clone());
        self.submitter = Some(node.clone());
        self.account = Some(node);
        self
    }

    pub fn chunk_sink(mut self, sink: Arc<dyn ChunkSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn submitter(mut self, submitter: Arc<dyn Submitter>) -> Self {
        self.submitter = Some(submitter);
        self
    }

    pub fn account(mut self, account: Arc<dyn AccountService>) -> Self {
        self.account = Some(account);
        self
    }

    /// Enable automatic top-ups.
    pub fn ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Uploader> {
        self.config.validate()?;
        let missing = |what: &str| ClientError::Config(format!("no {} configured", what));
        let sink = self.sink.ok_or_else(|| missing("chunk sink"))?;
        let submitter = self.submitter.ok_or_else(|| missing("submitter"))?;
        let account = self.account.ok_or_else(|| missing("account service"))?;

        Ok(Uploader {
            signer: self.signer,
            submitter,
            account,
            ledger: self.ledger,
            chunked: UploadOrchestrator::new(
                sink,
                self.config.chunk.clone(),
                self.config.upload.clone(),
            ),
            config: self.config,
        })
    }
}

impl Uploader {
    pub fn builder(signer: Arc<dyn Signer>) -> UploaderBuilder {
        UploaderBuilder {
            signer,
            sink: None,
            submitter: None,
            account: None,
            ledger: None,
            config: ClientConfig::default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Envelopes
    // ─────────────────────────────────────────────────────────────────────────

    /// Build and sign a data item with this uploader's signer.
    pub fn sign_item(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        options: &ItemOptions,
    ) -> Result<DataItem> {
        let mut builder = DataItemBuilder::new(payload)
            .tags(tags)
            .auto_content_type(self.config.auto_content_type);

        if let Some(target) = options.target {
            builder = builder.target(target.to_vec());
        }
        builder = match options.anchor {
            Some(anchor) => builder.anchor(anchor.to_vec()),
            None if options.random_anchor || self.config.random_anchor => builder.random_anchor(),
            None => builder,
        };

        Ok(builder.sign(self.signer.as_ref())?)
    }

    /// Sign a payload and return the encoded envelope.
    pub fn sign_and_encode(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        options: &ItemOptions,
    ) -> Result<Bytes> {
        let item = self.sign_item(payload, tags, options)?;
        Ok(Bytes::from(encode(&item)?))
    }

    /// Decode an envelope and check it as a node would.
    pub fn verify_envelope(&self, envelope: Bytes) -> Result<DataItem> {
        let item = decode_shared(envelope)?;
        verify(&item)?;
        Ok(item)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Uploads
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign and upload without any funding pre-flight.
    pub async fn upload(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let envelope = self.sign_and_encode(payload, tags, &ItemOptions::default())?;
        self.upload_envelope(envelope, cancel).await
    }

    /// Sign and upload in chunks, optionally reusing an existing session.
    pub async fn upload_chunked(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        resume: Option<SessionId>,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let envelope = self.sign_and_encode(payload, tags, &ItemOptions::default())?;
        Ok(self.chunked.upload(envelope, resume, cancel).await?)
    }

    /// Upload an already-signed envelope, picking the transport by size.
    pub async fn upload_envelope(
        &self,
        envelope: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        if self.chunked.policy().should_chunk(envelope.len()) {
            return Ok(self.chunked.upload(envelope, None, cancel).await?);
        }

        let len = envelope.len();
        let span = info_span!("single_upload", envelope_len = len);
        let tx = guarded(
            "submit",
            self.config.upload.request_timeout,
            cancel,
            self.submitter.submit(envelope),
        )
        .instrument(span)
        .await?;
        debug!(id = %tx.id, len, "envelope accepted");
        Ok(tx)
    }

    /// Sign, make sure the account can pay, then upload.
    ///
    /// The price is quoted on the encoded envelope length. When the balance
    /// is short and a ledger is configured, exactly the price is transferred;
    /// the upload only starts once the node confirms the transfer.
    pub async fn upload_with_funding(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        cancel: &CancellationToken,
    ) -> Result<UploadOutcome> {
        let envelope = self.sign_and_encode(payload, tags, &ItemOptions::default())?;
        let funding = self.funding()?;

        let outcome = funding
            .ensure_funded(envelope.len() as u64, cancel)
            .await?;
        let reference = match outcome {
            FundingOutcome::Pending {
                reference,
                price,
                balance,
            } => {
                info!(%reference, "upload deferred until funding is credited");
                return Ok(UploadOutcome::FundingPending {
                    reference,
                    price,
                    balance,
                });
            }
            FundingOutcome::Funded { reference, .. } => Some(reference),
            FundingOutcome::Covered { .. } => None,
        };

        let transaction = self.upload_envelope(envelope, cancel).await?;
        Ok(UploadOutcome::Uploaded {
            transaction,
            funding: reference,
        })
    }

    /// Upload against a price the caller already knows.
    ///
    /// One balance read; if it does not cover `known_price` this fails with
    /// [`ClientError::InsufficientBalance`] before anything is sent.
    pub async fn upload_checked(
        &self,
        payload: impl Into<Bytes>,
        tags: Vec<Tag>,
        known_price: &Amount,
        cancel: &CancellationToken,
    ) -> Result<Transaction> {
        let envelope = self.sign_and_encode(payload, tags, &ItemOptions::default())?;

        let balance = self.balance(cancel).await?;
        if &balance < known_price {
            return Err(ClientError::InsufficientBalance {
                price: known_price.clone(),
                balance,
            });
        }

        self.upload_envelope(envelope, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Account
    // ─────────────────────────────────────────────────────────────────────────

    /// Transfer `amount` to the node and wait for it to be credited.
    pub async fn top_up(
        &self,
        amount: &Amount,
        cancel: &CancellationToken,
    ) -> Result<TopUpConfirmation> {
        self.funding()?.top_up(amount, cancel).await
    }

    /// Price of storing `bytes` bytes.
    pub async fn price(&self, bytes: u64, cancel: &CancellationToken) -> Result<Amount> {
        self.call("price", cancel, self.account.price(bytes)).await
    }

    pub async fn balance(&self, cancel: &CancellationToken) -> Result<Amount> {
        self.call("balance", cancel, self.account.balance()).await
    }

    /// Look up an accepted transaction by id.
    pub async fn transaction(&self, id: &str, cancel: &CancellationToken) -> Result<Transaction> {
        self.call("transaction", cancel, self.account.transaction(id))
            .await
    }

    pub async fn node_info(&self, cancel: &CancellationToken) -> Result<NodeInfo> {
        self.call("node info", cancel, self.account.node_info()).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    fn funding(&self) -> Result<FundingOrchestrator> {
        let ledger = self
            .ledger
            .clone()
            .ok_or_else(|| ClientError::Config("no ledger configured".into()))?;
        Ok(FundingOrchestrator::new(
            self.account.clone(),
            ledger,
            self.config.funding.clone(),
            self.config.upload.request_timeout,
        ))
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: impl Future<Output = std::result::Result<T, RemoteError>>,
    ) -> Result<T> {
        guarded(operation, self.config.upload.request_timeout, cancel, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permabundle_core::{decode, Ed25519Signer};
    use permabundle_transport::memory::MemoryNode;

    fn uploader(config: ClientConfig) -> Uploader {
        Uploader::builder(Arc::new(Ed25519Signer::from_secret_bytes(&[3u8; 32])))
            .node(MemoryNode::new())
            .config(config)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_node() {
        let result = Uploader::builder(Arc::new(Ed25519Signer::generate())).build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_sign_and_encode_adds_content_type() {
        let uploader = uploader(ClientConfig::default());
        let envelope = uploader
            .sign_and_encode(&b"plain words"[..], vec![], &ItemOptions::default())
            .unwrap();

        let item = decode(&envelope).unwrap();
        assert_eq!(item.tag("Content-Type"), Some(&b"text/plain; charset=utf-8"[..]));
        assert!(item.anchor().is_none());

        let options = ItemOptions {
            random_anchor: true,
            ..ItemOptions::default()
        };
        let item = uploader.sign_item(&b"x"[..], vec![], &options).unwrap();
        assert_eq!(item.anchor().map(<[u8]>::len), Some(32));
    }

    #[test]
    fn test_random_anchor_and_options() {
        let uploader = uploader(ClientConfig {
            random_anchor: true,
            auto_content_type: false,
            ..ClientConfig::default()
        });

        let item = uploader
            .sign_item(&b"x"[..], vec![], &ItemOptions::default())
            .unwrap();
        assert_eq!(item.anchor().map(<[u8]>::len), Some(32));
        assert!(item.tags().is_empty());

        let options = ItemOptions {
            target: Some([7u8; 32]),
            anchor: Some([9u8; 32]),
            random_anchor: false,
        };
        let item = uploader.sign_item(&b"x"[..], vec![], &options).unwrap();
        assert_eq!(item.anchor(), Some(&[9u8; 32][..]));
        assert_eq!(item.target(), Some(&[7u8; 32][..]));
    }

    #[test]
    fn test_verify_envelope() {
        let uploader = uploader(ClientConfig::default());
        let envelope = uploader
            .sign_and_encode(&b"checked"[..], vec![], &ItemOptions::default())
            .unwrap();
        assert!(uploader.verify_envelope(envelope.clone()).is_ok());

        let mut tampered = envelope.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 1;
        assert!(matches!(
            uploader.verify_envelope(Bytes::from(tampered)),
            Err(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_funding_without_ledger() {
        let uploader = uploader(ClientConfig::default());
        let err = uploader
            .upload_with_funding(&b"x"[..], vec![], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
