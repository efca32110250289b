//! Deep hash: a structured, shape-sensitive digest over nested byte lists.
//!
//! Leaves are byte strings, branches are ordered lists. The digest commits to
//! the content of every leaf and to the length of every list, so reordering
//! elements, moving a leaf into a sublist or dropping an element all change
//! the result.
//!
//! Algorithm (H = SHA-256):
//! - blob: `H(H("blob" || decimal(len)) || H(bytes))`
//! - list: `acc = H(H("list") || H(decimal(count)))`, then for each child
//!   left to right `acc = H(H(acc) || H(deep_hash(child)))`

use crate::crypto::Sha256Hash;

const BLOB_TAG: &[u8] = b"blob";
const LIST_TAG: &[u8] = b"list";

/// A node of the deep hash input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepHashChunk<'a> {
    /// A byte-string leaf.
    Blob(&'a [u8]),
    /// An ordered list of children.
    List(Vec<DeepHashChunk<'a>>),
}

impl<'a> From<&'a [u8]> for DeepHashChunk<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        DeepHashChunk::Blob(bytes)
    }
}

/// Compute the deep hash of a chunk.
pub fn deep_hash(chunk: &DeepHashChunk<'_>) -> Sha256Hash {
    match chunk {
        DeepHashChunk::Blob(bytes) => hash_blob(bytes),
        DeepHashChunk::List(children) => hash_list(children),
    }
}

fn hash_blob(bytes: &[u8]) -> Sha256Hash {
    let mut tag = Vec::with_capacity(BLOB_TAG.len() + 20);
    tag.extend_from_slice(BLOB_TAG);
    tag.extend_from_slice(bytes.len().to_string().as_bytes());

    let tagged = Sha256Hash::hash(&tag);
    let content = Sha256Hash::hash(bytes);
    Sha256Hash::hash_pair(tagged.as_bytes(), content.as_bytes())
}

fn hash_list(children: &[DeepHashChunk<'_>]) -> Sha256Hash {
    let tagged = Sha256Hash::hash(LIST_TAG);
    let count = Sha256Hash::hash(children.len().to_string().as_bytes());
    let mut acc = Sha256Hash::hash_pair(tagged.as_bytes(), count.as_bytes());

    for child in children {
        let child_digest = deep_hash(child);
        let left = Sha256Hash::hash(acc.as_bytes());
        let right = Sha256Hash::hash(child_digest.as_bytes());
        acc = Sha256Hash::hash_pair(left.as_bytes(), right.as_bytes());
    }

    acc
}
