//! # Permabundle Core
//!
//! Pure primitives for building and checking data items: the signed,
//! self-verifying envelopes submitted to a permanent-storage network.
//!
//! This crate contains no I/O, no async, no networking. It is pure computation
//! over byte layouts and signatures.
//!
//! ## Key Types
//!
//! - [`DataItem`] - The envelope: payload, tags, optional target/anchor, signature
//! - [`DataItemBuilder`] - Assembles an unsigned item
//! - [`DataItemId`] - SHA-256 of the signature, the item's network identifier
//! - [`Signer`] - Capability implemented by each signature scheme
//! - [`SignatureType`] - Scheme identifier carried in the envelope
//!
//! ## Signing Payload
//!
//! Items are signed over a [`deep_hash`] of their fields, a structured hash
//! that commits to both content and shape. See [`deep_hash`] module.
//!
//! ## Envelope Layout
//!
//! The binary layout is fixed by the network and implemented in [`codec`].

pub mod bundle;
pub mod codec;
pub mod content_type;
pub mod crypto;
pub mod data_item;
pub mod deep_hash;
pub mod error;
pub mod signer;
pub mod tags;
pub mod types;
pub mod validation;

pub use bundle::{decode_bundle, encode_bundle};
pub use codec::{decode, decode_shared, encode};
pub use crypto::Sha256Hash;
pub use data_item::{DataItem, DataItemBuilder, SignedParts};
pub use deep_hash::{deep_hash, DeepHashChunk};
pub use error::{CoreError, SignerError, TagField, ValidationError};
pub use signer::{
    verifier_for, ArweaveSigner, Ed25519Signer, EthereumSigner, SignatureType, Signer,
};
pub use tags::Tag;
pub use types::DataItemId;
pub use validation::{verify, verify_structure};
