//! Data item: the signed envelope submitted to the network.
//!
//! An item is either unsigned (no owner, signature or id) or fully signed.
//! Signing is a one-way transition and a second call is a no-op. After signing
//! the item is immutable.

use std::sync::OnceLock;

use bytes::Bytes;
use rand::RngCore;

use crate::bundle::{encode_bundle, BUNDLE_FORMAT_TAGS};
use crate::codec;
use crate::content_type::ensure_content_type;
use crate::crypto::Sha256Hash;
use crate::deep_hash::{deep_hash, DeepHashChunk};
use crate::error::{CoreError, SignerError};
use crate::signer::{SignatureType, Signer};
use crate::tags::{serialize_tags, Tag};
use crate::types::DataItemId;

/// Format marker in the signing payload.
const FORMAT_NAME: &[u8] = b"dataitem";
/// Format version in the signing payload.
const FORMAT_VERSION: &[u8] = b"1";

/// Length of a present target or anchor.
pub const ADDRESS_LEN: usize = 32;

/// The signed portion of an item, present only once signed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Seal {
    signature_type: SignatureType,
    owner: Vec<u8>,
    signature: Vec<u8>,
    id: DataItemId,
}

/// A data item.
#[derive(Debug, Clone)]
pub struct DataItem {
    /// Empty when absent.
    target: Vec<u8>,
    /// Empty when absent.
    anchor: Vec<u8>,
    tags: Vec<Tag>,
    data: Bytes,
    seal: Option<Seal>,
    /// Serialized tags, computed once and shared by signing, sizing and encoding.
    tags_bytes: OnceLock<Vec<u8>>,
}

/// The fields of an already-signed item, as kept by a store or another codec.
#[derive(Debug, Clone)]
pub struct SignedParts {
    pub signature_type: SignatureType,
    pub owner: Vec<u8>,
    pub signature: Vec<u8>,
    pub id: DataItemId,
    pub target: Vec<u8>,
    pub anchor: Vec<u8>,
    pub tags: Vec<Tag>,
    pub data: Bytes,
}

impl DataItem {
    fn unsigned(target: Vec<u8>, anchor: Vec<u8>, tags: Vec<Tag>, data: Bytes) -> Self {
        Self {
            target,
            anchor,
            tags,
            data,
            seal: None,
            tags_bytes: OnceLock::new(),
        }
    }

    /// Reassemble a signed item from stored parts.
    ///
    /// Nothing is checked here; run [`crate::verify`] before trusting the result.
    pub fn from_signed_parts(parts: SignedParts) -> Self {
        let mut item = Self::unsigned(parts.target, parts.anchor, parts.tags, parts.data);
        item.seal = Some(Seal {
            signature_type: parts.signature_type,
            owner: parts.owner,
            signature: parts.signature,
            id: parts.id,
        });
        item
    }

    /// Item produced by the decoder: the received tag bytes become the cached
    /// serialization so that re-encoding reproduces the input exactly.
    pub(crate) fn decoded(parts: SignedParts, tags_bytes: Vec<u8>) -> Self {
        let item = Self::from_signed_parts(parts);
        // Freshly created cell, cannot already be set.
        let _ = item.tags_bytes.set(tags_bytes);
        item
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_signed(&self) -> bool {
        self.seal.is_some()
    }

    pub fn id(&self) -> Option<DataItemId> {
        self.seal.as_ref().map(|s| s.id)
    }

    pub fn signature_type(&self) -> Option<SignatureType> {
        self.seal.as_ref().map(|s| s.signature_type)
    }

    pub fn owner(&self) -> Option<&[u8]> {
        self.seal.as_ref().map(|s| s.owner.as_slice())
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.seal.as_ref().map(|s| s.signature.as_slice())
    }

    pub fn target(&self) -> Option<&[u8]> {
        (!self.target.is_empty()).then_some(self.target.as_slice())
    }

    pub fn anchor(&self) -> Option<&[u8]> {
        (!self.anchor.is_empty()).then_some(self.anchor.as_slice())
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Value of the first tag named `name`.
    pub fn tag(&self, name: &str) -> Option<&[u8]> {
        self.tags
            .iter()
            .find(|t| t.name == name.as_bytes())
            .map(|t| t.value.as_slice())
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Serialized tags. Computed on first use, then reused.
    pub fn tags_bytes(&self) -> &[u8] {
        self.tags_bytes.get_or_init(|| serialize_tags(&self.tags))
    }

    /// Exact length of [`codec::encode`]'s output.
    pub fn size(&self) -> Result<usize, CoreError> {
        codec::encoded_len(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Signing
    // ─────────────────────────────────────────────────────────────────────────

    /// Sign the item. A signed item is left untouched.
    pub fn sign(&mut self, signer: &dyn Signer) -> Result<(), CoreError> {
        if self.is_signed() {
            return Ok(());
        }

        let kind = signer.signature_type();
        let owner = signer.owner().to_vec();
        if owner.len() != kind.owner_length() {
            return Err(SignerError::InvalidKey(format!(
                "owner is {} bytes, {} requires {}",
                owner.len(),
                kind,
                kind.owner_length()
            ))
            .into());
        }

        let message = self.message_for(kind, &owner);
        let signature = signer.sign(message.as_bytes())?;
        if signature.len() != kind.signature_length() {
            return Err(SignerError::InvalidSignature(format!(
                "{} signer produced {} bytes, expected {}",
                kind,
                signature.len(),
                kind.signature_length()
            ))
            .into());
        }

        self.seal = Some(Seal {
            signature_type: kind,
            owner,
            id: DataItemId::from_signature(&signature),
            signature,
        });
        Ok(())
    }

    /// Deep hash the signature covers. Fails on an unsigned item, which has no owner yet.
    pub fn signing_message(&self) -> Result<Sha256Hash, CoreError> {
        let seal = self.seal.as_ref().ok_or(CoreError::NotSigned)?;
        Ok(self.message_for(seal.signature_type, &seal.owner))
    }

    fn message_for(&self, kind: SignatureType, owner: &[u8]) -> Sha256Hash {
        let scheme = kind.decimal_bytes();
        let fields = DeepHashChunk::List(vec![
            DeepHashChunk::Blob(FORMAT_NAME),
            DeepHashChunk::Blob(FORMAT_VERSION),
            DeepHashChunk::Blob(&scheme),
            DeepHashChunk::Blob(owner),
            DeepHashChunk::Blob(&self.target),
            DeepHashChunk::Blob(&self.anchor),
            DeepHashChunk::Blob(self.tags_bytes()),
            DeepHashChunk::Blob(&self.data),
        ]);
        deep_hash(&fields)
    }

    pub(crate) fn raw_target(&self) -> &[u8] {
        &self.target
    }

    pub(crate) fn raw_anchor(&self) -> &[u8] {
        &self.anchor
    }
}

impl PartialEq for DataItem {
    fn eq(&self, other: &Self) -> bool {
        self.seal == other.seal
            && self.target == other.target
            && self.anchor == other.anchor
            && self.tags == other.tags
            && self.data == other.data
    }
}

impl Eq for DataItem {}

/// Builder for unsigned data items.
#[derive(Debug, Clone, Default)]
pub struct DataItemBuilder {
    data: Bytes,
    tags: Vec<Tag>,
    target: Vec<u8>,
    anchor: Vec<u8>,
    auto_content_type: bool,
}

impl DataItemBuilder {
    /// Start building an item around `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Start building an item whose payload is a bundle of signed `items`.
    pub fn nested(items: &[DataItem]) -> Result<Self, CoreError> {
        let mut builder = Self::new(encode_bundle(items)?);
        for (name, value) in BUNDLE_FORMAT_TAGS {
            builder = builder.tag(*name, *value);
        }
        Ok(builder)
    }

    /// Append a tag.
    pub fn tag(mut self, name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    /// Append several tags, keeping their order.
    pub fn tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Set the target. A valid target is 32 bytes.
    pub fn target(mut self, target: impl Into<Vec<u8>>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the anchor. A valid anchor is 32 bytes.
    pub fn anchor(mut self, anchor: impl Into<Vec<u8>>) -> Self {
        self.anchor = anchor.into();
        self
    }

    /// Use 32 fresh random bytes as the anchor.
    pub fn random_anchor(mut self) -> Self {
        let mut anchor = vec![0u8; ADDRESS_LEN];
        rand::thread_rng().fill_bytes(&mut anchor);
        self.anchor = anchor;
        self
    }

    /// Add a sniffed `Content-Type` tag at build time unless one is present.
    pub fn auto_content_type(mut self, enabled: bool) -> Self {
        self.auto_content_type = enabled;
        self
    }

    /// Finish as an unsigned item.
    pub fn build(self) -> DataItem {
        let mut tags = self.tags;
        if self.auto_content_type {
            ensure_content_type(&mut tags, &self.data);
        }
        DataItem::unsigned(self.target, self.anchor, tags, self.data)
    }

    /// Finish and sign.
    pub fn sign(self, signer: &dyn Signer) -> Result<DataItem, CoreError> {
        let mut item = self.build();
        item.sign(signer)?;
        Ok(item)
    }
}
