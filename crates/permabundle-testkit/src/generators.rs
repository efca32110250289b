//! Proptest generators for property-based testing.

use proptest::prelude::*;

use permabundle_core::tags::limits;
use permabundle_core::{DataItem, DataItemBuilder, Ed25519Signer, EthereumSigner, Signer, Tag};

/// Signature schemes cheap enough to generate per case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Ed25519,
    Ethereum,
}

pub fn scheme() -> impl Strategy<Value = Scheme> {
    prop_oneof![Just(Scheme::Ed25519), Just(Scheme::Ethereum)]
}

/// A 32-byte seed that is also a valid secp256k1 scalar.
pub fn seed() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>().prop_map(|mut seed| {
        seed[0] &= 0x7f;
        seed[31] |= 0x01;
        seed
    })
}

/// Generate a 32-byte address (target or anchor).
pub fn address() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

/// Generate payload bytes of specified max length.
pub fn data(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a tag within the per-field limits, biased toward short fields.
pub fn tag() -> impl Strategy<Value = Tag> {
    (
        prop::collection::vec(any::<u8>(), 1..=48),
        prop::collection::vec(any::<u8>(), 1..=96),
    )
        .prop_map(|(name, value)| Tag::new(name, value))
}

/// Generate up to `max` tags whose serialized form stays under the total limit.
pub fn tags(max: usize) -> impl Strategy<Value = Vec<Tag>> {
    prop::collection::vec(tag(), 0..=max.min(limits::MAX_TAGS)).prop_map(|mut tags| {
        while permabundle_core::tags::serialize_tags(&tags).len() > limits::MAX_TAG_BYTES {
            tags.pop();
        }
        tags
    })
}

/// Parameters for generating a signed item.
#[derive(Debug, Clone)]
pub struct ItemParams {
    pub scheme: Scheme,
    pub seed: [u8; 32],
    pub data: Vec<u8>,
    pub tags: Vec<Tag>,
    pub target: Option<[u8; 32]>,
    pub anchor: Option<[u8; 32]>,
}

impl ItemParams {
    pub fn signer(&self) -> Box<dyn Signer> {
        match self.scheme {
            Scheme::Ed25519 => Box::new(Ed25519Signer::from_secret_bytes(&self.seed)),
            Scheme::Ethereum => Box::new(
                EthereumSigner::from_secret_bytes(&self.seed).expect("seed is a valid scalar"),
            ),
        }
    }

    /// The item before signing.
    pub fn builder(&self) -> DataItemBuilder {
        let mut builder = DataItemBuilder::new(self.data.clone()).tags(self.tags.clone());
        if let Some(target) = self.target {
            builder = builder.target(target.to_vec());
        }
        if let Some(anchor) = self.anchor {
            builder = builder.anchor(anchor.to_vec());
        }
        builder
    }
}

impl Arbitrary for ItemParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            scheme(),
            seed(),
            data(2048),
            tags(8),
            proptest::option::of(address()),
            proptest::option::of(address()),
        )
            .prop_map(|(scheme, seed, data, tags, target, anchor)| ItemParams {
                scheme,
                seed,
                data,
                tags,
                target,
                anchor,
            })
            .boxed()
    }
}

/// Build and sign an item from parameters.
pub fn item_from_params(params: &ItemParams) -> DataItem {
    params
        .builder()
        .sign(params.signer().as_ref())
        .expect("generated item signs")
}
