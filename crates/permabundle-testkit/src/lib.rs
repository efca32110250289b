//! # Permabundle Testkit
//!
//! Testing utilities for Permabundle.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed Ed25519 items with their expected envelope bytes and ids
//! - **Generators**: Proptest strategies for tags and signed items
//! - **Fixtures**: Deterministic signers plus an in-memory node and ledger
//!
//! ## Golden Vectors
//!
//! Ed25519 signatures are deterministic, so a seed, payload and tag list pin
//! down every byte of the envelope:
//!
//! ```rust
//! use permabundle_testkit::vectors::{all_vectors, item_from_vector};
//!
//! for vector in all_vectors() {
//!     let item = item_from_vector(&vector);
//!     println!("{}: {}", vector.name, item.id().unwrap().to_hex());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use permabundle_testkit::generators::{item_from_params, ItemParams};
//!
//! proptest! {
//!     #[test]
//!     fn envelope_round_trips(params: ItemParams) {
//!         let item = item_from_params(&params);
//!         let bytes = permabundle_core::encode(&item).unwrap();
//!         prop_assert_eq!(permabundle_core::decode(&bytes).unwrap(), item);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use permabundle_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::with_seed([1; 32]);
//! let envelope = fixture.envelope(b"payload");
//! assert!(!envelope.is_empty());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{ethereum_signer, fast_upload_config, payload, small_chunk_policy, TestFixture};
pub use generators::{item_from_params, ItemParams, Scheme};
pub use vectors::{
    all_vectors, deep_hash_vectors, item_from_vector, verify_all_vectors, DeepHashVector,
    GoldenVector,
};
