//! Binary envelope codec.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! scheme id        u16
//! signature        signature_length(scheme) bytes
//! owner            owner_length(scheme) bytes
//! target flag      u8, then 32 bytes if 1
//! anchor flag      u8, then 32 bytes if 1
//! tag count        u64
//! tag bytes len    u64
//! tag bytes        serialized tags
//! data             rest of the input
//! ```

use bytes::Bytes;

use crate::data_item::{DataItem, SignedParts, ADDRESS_LEN};
use crate::error::CoreError;
use crate::signer::SignatureType;
use crate::tags::deserialize_tags;
use crate::types::DataItemId;

/// Exact number of bytes [`encode`] will produce.
pub fn encoded_len(item: &DataItem) -> Result<usize, CoreError> {
    let kind = item.signature_type().ok_or(CoreError::NotSigned)?;
    Ok(2 + kind.signature_length()
        + kind.owner_length()
        + 1
        + item.target().map_or(0, <[u8]>::len)
        + 1
        + item.anchor().map_or(0, <[u8]>::len)
        + 8
        + 8
        + item.tags_bytes().len()
        + item.data().len())
}

/// Encode a signed item.
pub fn encode(item: &DataItem) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::with_capacity(encoded_len(item)?);
    encode_to(item, &mut buf)?;
    Ok(buf)
}

/// Append the encoding of a signed item to `buf`.
pub fn encode_to(item: &DataItem, buf: &mut Vec<u8>) -> Result<(), CoreError> {
    let (kind, owner, signature) = match (item.signature_type(), item.owner(), item.signature()) {
        (Some(kind), Some(owner), Some(signature)) => (kind, owner, signature),
        _ => return Err(CoreError::NotSigned),
    };

    let target = item.raw_target();
    if !target.is_empty() && target.len() != ADDRESS_LEN {
        return Err(CoreError::BadTargetLength(target.len()));
    }
    let anchor = item.raw_anchor();
    if !anchor.is_empty() && anchor.len() != ADDRESS_LEN {
        return Err(CoreError::BadAnchorLength(anchor.len()));
    }

    let start = buf.len();
    buf.extend_from_slice(&kind.to_u16().to_le_bytes());
    buf.extend_from_slice(signature);
    buf.extend_from_slice(owner);
    write_optional(buf, target);
    write_optional(buf, anchor);

    let tags_bytes = item.tags_bytes();
    buf.extend_from_slice(&(item.tags().len() as u64).to_le_bytes());
    buf.extend_from_slice(&(tags_bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(tags_bytes);
    buf.extend_from_slice(item.data());

    debug_assert_eq!(buf.len() - start, encoded_len(item)?);
    Ok(())
}

fn write_optional(buf: &mut Vec<u8>, field: &[u8]) {
    if field.is_empty() {
        buf.push(0);
    } else {
        buf.push(1);
        buf.extend_from_slice(field);
    }
}

/// Decode an envelope, copying the input.
///
/// Decoding never checks the signature; use [`crate::verify`] for that.
pub fn decode(bytes: &[u8]) -> Result<DataItem, CoreError> {
    decode_shared(Bytes::copy_from_slice(bytes))
}

/// Decode an envelope. The payload is a zero-copy slice of `bytes`.
pub fn decode_shared(bytes: Bytes) -> Result<DataItem, CoreError> {
    let mut reader = Reader::new(&bytes);

    let scheme_id = u16::from_le_bytes(reader.array::<2>("signature type")?);
    let kind = SignatureType::from_u16(scheme_id).map_err(|_| CoreError::UnsupportedScheme(scheme_id))?;

    let signature = reader.take("signature", kind.signature_length())?.to_vec();
    let owner = reader.take("owner", kind.owner_length())?.to_vec();
    let target = reader.optional("target")?;
    let anchor = reader.optional("anchor")?;

    let tag_count = u64::from_le_bytes(reader.array::<8>("tag count")?);
    let tags_len = u64::from_le_bytes(reader.array::<8>("tag bytes length")?);
    let tags_len = usize::try_from(tags_len).map_err(|_| CoreError::Truncated {
        field: "tag bytes",
        needed: usize::MAX,
        available: reader.remaining(),
    })?;
    let tags_bytes = reader.take("tag bytes", tags_len)?.to_vec();

    let tags = deserialize_tags(&tags_bytes)?;
    if tags.len() as u64 != tag_count {
        return Err(CoreError::MalformedTags(format!(
            "header declares {} tags, body holds {}",
            tag_count,
            tags.len()
        )));
    }

    let data = bytes.slice(reader.pos..);
    let id = DataItemId::from_signature(&signature);

    Ok(DataItem::decoded(
        SignedParts {
            signature_type: kind,
            owner,
            signature,
            id,
            target,
            anchor,
            tags,
            data,
        },
        tags_bytes,
    ))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, field: &'static str, len: usize) -> Result<&'a [u8], CoreError> {
        if len > self.remaining() {
            return Err(CoreError::Truncated {
                field,
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], CoreError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(field, N)?);
        Ok(out)
    }

    /// A presence flag followed by a 32-byte field when set.
    fn optional(&mut self, field: &'static str) -> Result<Vec<u8>, CoreError> {
        match self.array::<1>(field)?[0] {
            0 => Ok(Vec::new()),
            1 => Ok(self.take(field, ADDRESS_LEN)?.to_vec()),
            flag => Err(CoreError::MalformedItem(format!(
                "{} presence flag must be 0 or 1, got {}",
                field, flag
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_item::DataItemBuilder;
    use crate::signer::{Ed25519Signer, EthereumSigner, Signer};

    fn signer() -> Ed25519Signer {
        Ed25519Signer::from_secret_bytes(&[11u8; 32])
    }

    #[test]
    fn test_roundtrip_all_fields() {
        let item = DataItemBuilder::new(&b"payload bytes"[..])
            .tag("Content-Type", "text/plain")
            .tag("App-Name", "codec-test")
            .target([7u8; 32])
            .anchor([8u8; 32])
            .sign(&signer())
            .unwrap();

        let bytes = encode(&item).unwrap();
        assert_eq!(bytes.len(), item.size().unwrap());

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, item);
        assert_eq!(decoded.id(), item.id());
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_minimal_layout() {
        let item = DataItemBuilder::new(&b"x"[..]).sign(&signer()).unwrap();
        let bytes = encode(&item).unwrap();

        assert_eq!(&bytes[..2], &[2, 0]);
        let flags_at = 2 + 64 + 32;
        assert_eq!(bytes[flags_at], 0);
        assert_eq!(bytes[flags_at + 1], 0);
        assert_eq!(&bytes[flags_at + 2..flags_at + 18], &[0u8; 16]);
        assert_eq!(&bytes[flags_at + 18..], b"x");
    }

    #[test]
    fn test_size_matches_encoding() {
        let variants = [
            DataItemBuilder::new(&b""[..]),
            DataItemBuilder::new(&b"d"[..]).tag("n", "v"),
            DataItemBuilder::new(&b"d"[..]).target([1u8; 32]),
            DataItemBuilder::new(&b"d"[..]).anchor([1u8; 32]),
            DataItemBuilder::new(&b"d"[..]).tag("n", "v").target([1u8; 32]).anchor([2u8; 32]),
        ];
        for builder in variants {
            let item = builder.sign(&signer()).unwrap();
            assert_eq!(item.size().unwrap(), encode(&item).unwrap().len());
        }
    }

    #[test]
    fn test_ethereum_item_roundtrip() {
        let eth = EthereumSigner::generate();
        let item = DataItemBuilder::new(&b"eth"[..]).sign(&eth).unwrap();
        let decoded = decode(&encode(&item).unwrap()).unwrap();
        assert_eq!(decoded.owner(), Some(eth.owner()));
        assert_eq!(decoded.signature().map(<[u8]>::len), Some(65));
    }

    #[test]
    fn test_encode_unsigned_fails() {
        let item = DataItemBuilder::new(&b"x"[..]).build();
        assert!(matches!(encode(&item), Err(CoreError::NotSigned)));
        assert!(matches!(item.size(), Err(CoreError::NotSigned)));
    }

    #[test]
    fn test_encode_rejects_short_anchor() {
        let item = DataItemBuilder::new(&b"x"[..])
            .anchor(vec![0u8; 31])
            .sign(&signer())
            .unwrap();
        assert!(matches!(encode(&item), Err(CoreError::BadAnchorLength(31))));
    }

    #[test]
    fn test_truncated_input() {
        let item = DataItemBuilder::new(&b"x"[..])
            .anchor([3u8; 32])
            .sign(&signer())
            .unwrap();
        let bytes = encode(&item).unwrap();

        assert!(matches!(
            decode(&bytes[..1]),
            Err(CoreError::Truncated { field: "signature type", .. })
        ));
        assert!(matches!(
            decode(&bytes[..50]),
            Err(CoreError::Truncated { field: "signature", needed: 64, available: 48 })
        ));
        assert!(matches!(
            decode(&bytes[..2 + 64 + 32 + 1 + 10]),
            Err(CoreError::Truncated { field: "anchor", .. })
        ));
    }

    #[test]
    fn test_unknown_scheme() {
        let mut bytes = encode(&DataItemBuilder::new(&b"x"[..]).sign(&signer()).unwrap()).unwrap();
        bytes[0] = 0x09;
        assert!(matches!(decode(&bytes), Err(CoreError::UnsupportedScheme(9))));
    }

    #[test]
    fn test_bad_presence_flag() {
        let mut bytes = encode(&DataItemBuilder::new(&b"x"[..]).sign(&signer()).unwrap()).unwrap();
        bytes[2 + 64 + 32] = 2;
        assert!(matches!(decode(&bytes), Err(CoreError::MalformedItem(_))));
    }

    #[test]
    fn test_tag_count_mismatch() {
        let item = DataItemBuilder::new(&b"x"[..])
            .tag("a", "b")
            .sign(&signer())
            .unwrap();
        let mut bytes = encode(&item).unwrap();
        bytes[2 + 64 + 32 + 2] = 2;
        assert!(matches!(decode(&bytes), Err(CoreError::MalformedTags(_))));
    }

    #[test]
    fn test_decode_shared_slices_payload() {
        let item = DataItemBuilder::new(vec![5u8; 1024]).sign(&signer()).unwrap();
        let bytes = Bytes::from(encode(&item).unwrap());
        let decoded = decode_shared(bytes.clone()).unwrap();
        let payload_start = bytes.len() - 1024;
        assert_eq!(decoded.data().as_ptr(), bytes[payload_start..].as_ptr());
    }
}
