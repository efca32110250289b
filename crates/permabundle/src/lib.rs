//! # Permabundle
//!
//! The unified API for Permabundle: sign payloads into self-verifying data
//! items and upload them to a permanent-storage node.
//!
//! ## Overview
//!
//! - **Data items**: Signed envelopes carrying payload, tags, target and anchor
//! - **Signers**: Arweave (RSA-PSS), Ed25519 and Ethereum (secp256k1) schemes
//! - **Transport**: Single-request uploads and concurrent chunked uploads
//! - **Funding**: Price and balance checks, with automatic top-ups through a ledger
//!
//! ## Key Concepts
//!
//! - **Envelope**: The encoded, signed data item. Prices are quoted on its length.
//! - **Chunk session**: A node-side session that receives envelope slices by offset.
//! - **Top-up**: A ledger transfer for exactly the missing price. The upload
//!   starts only after the node confirms it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use permabundle::{CancellationToken, ClientConfig, Tag, Uploader, UploadOutcome};
//! use permabundle::core::Ed25519Signer;
//! use permabundle::transport::memory::{MemoryLedger, MemoryNode};
//!
//! async fn example() {
//!     let node = MemoryNode::new();
//!     let ledger = MemoryLedger::new(node.clone());
//!
//!     let uploader = Uploader::builder(Arc::new(Ed25519Signer::generate()))
//!         .node(node)
//!         .ledger(ledger)
//!         .config(ClientConfig::default())
//!         .build()
//!         .unwrap();
//!
//!     let tags = vec![Tag::new("App-Name", "example")];
//!     let outcome = uploader
//!         .upload_with_funding(&b"hello"[..], tags, &CancellationToken::new())
//!         .await
//!         .unwrap();
//!
//!     if let UploadOutcome::Uploaded { transaction, .. } = outcome {
//!         println!("stored as {}", transaction.id);
//!     }
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `permabundle::core` - Data items, codec, signers and validation
//! - `permabundle::transport` - Remote traits, chunked uploads, in-memory node

pub mod client;
pub mod config;
pub mod error;
pub mod funding;

// Re-export component crates
pub use permabundle_core as core;
pub use permabundle_transport as transport;

// Re-export main types for convenience
pub use client::{ItemOptions, UploadOutcome, Uploader, UploaderBuilder};
pub use config::{ClientConfig, FundingConfig};
pub use error::{ClientError, Result};
pub use funding::{FundingOrchestrator, FundingOutcome, TopUpConfirmation};

// Re-export commonly used types
pub use permabundle_core::{DataItem, DataItemBuilder, DataItemId, SignatureType, Signer, Tag};
pub use permabundle_transport::{Amount, CancellationToken, SessionId, Transaction};
