//! Nested bundles: several signed items packed into one payload.
//!
//! ```text
//! item count                 32 bytes, little-endian
//! per item: size, id         32 bytes little-endian + 32 bytes
//! item envelopes             concatenated, in header order
//! ```

use bytes::Bytes;

use crate::codec::{decode_shared, encode_to, encoded_len};
use crate::data_item::DataItem;
use crate::error::CoreError;

/// Tags that mark an item's payload as a bundle.
pub const BUNDLE_FORMAT_TAGS: &[(&str, &str)] =
    &[("Bundle-Format", "binary"), ("Bundle-Version", "2.0.0")];

const WORD: usize = 32;

/// Pack signed items into a bundle binary.
pub fn encode_bundle(items: &[DataItem]) -> Result<Vec<u8>, CoreError> {
    let mut sizes = Vec::with_capacity(items.len());
    for item in items {
        sizes.push(encoded_len(item)?);
    }

    let header_len = WORD + items.len() * 2 * WORD;
    let mut buf = Vec::with_capacity(header_len + sizes.iter().sum::<usize>());

    write_word(&mut buf, items.len() as u64);
    for (item, size) in items.iter().zip(&sizes) {
        write_word(&mut buf, *size as u64);
        let id = item.id().ok_or(CoreError::NotSigned)?;
        buf.extend_from_slice(id.as_bytes());
    }
    for item in items {
        encode_to(item, &mut buf)?;
    }
    Ok(buf)
}

/// Unpack a bundle binary. Item envelopes are decoded, not verified.
pub fn decode_bundle(bytes: &[u8]) -> Result<Vec<DataItem>, CoreError> {
    let shared = Bytes::copy_from_slice(bytes);

    let count = read_word(bytes, 0)?;
    let header_len = count
        .checked_mul(2 * WORD)
        .and_then(|n| n.checked_add(WORD))
        .filter(|n| *n <= bytes.len())
        .ok_or_else(|| {
            CoreError::MalformedBundle(format!(
                "{} entries do not fit in {} bytes",
                count,
                bytes.len()
            ))
        })?;

    let mut items = Vec::with_capacity(count);
    let mut offset = header_len;
    for index in 0..count {
        let entry = WORD + index * 2 * WORD;
        let size = read_word(bytes, entry)?;
        let declared_id = &bytes[entry + WORD..entry + 2 * WORD];

        let end = offset
            .checked_add(size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                CoreError::MalformedBundle(format!(
                    "item {} of {} bytes overruns the bundle",
                    index, size
                ))
            })?;

        let item = decode_shared(shared.slice(offset..end))?;
        if item.id().map(|id| id.as_bytes().as_slice() != declared_id).unwrap_or(true) {
            return Err(CoreError::MalformedBundle(format!(
                "item {} id does not match its header entry",
                index
            )));
        }
        items.push(item);
        offset = end;
    }

    if offset != bytes.len() {
        return Err(CoreError::MalformedBundle(format!(
            "{} trailing bytes",
            bytes.len() - offset
        )));
    }

    Ok(items)
}

fn write_word(buf: &mut Vec<u8>, n: u64) {
    buf.extend_from_slice(&n.to_le_bytes());
    buf.extend_from_slice(&[0u8; WORD - 8]);
}

fn read_word(bytes: &[u8], at: usize) -> Result<usize, CoreError> {
    let word = bytes.get(at..at + WORD).ok_or(CoreError::Truncated {
        field: "bundle header",
        needed: at + WORD,
        available: bytes.len(),
    })?;
    if word[8..].iter().any(|b| *b != 0) {
        return Err(CoreError::MalformedBundle("header value exceeds 64 bits".into()));
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[..8]);
    usize::try_from(u64::from_le_bytes(low))
        .map_err(|_| CoreError::MalformedBundle("header value exceeds address space".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode;
    use crate::data_item::DataItemBuilder;
    use crate::signer::Ed25519Signer;
    use crate::validation::verify;

    fn items() -> Vec<DataItem> {
        let signer = Ed25519Signer::from_secret_bytes(&[33u8; 32]);
        (0..3)
            .map(|i| {
                DataItemBuilder::new(vec![i as u8; 10 + i])
                    .tag("Index", i.to_string())
                    .sign(&signer)
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_bundle_roundtrip() {
        let items = items();
        let bundle = encode_bundle(&items).unwrap();
        assert_eq!(&bundle[..8], &3u64.to_le_bytes());

        let decoded = decode_bundle(&bundle).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = encode_bundle(&[]).unwrap();
        assert_eq!(bundle, vec![0u8; 32]);
        assert!(decode_bundle(&bundle).unwrap().is_empty());
    }

    #[test]
    fn test_unsigned_item_rejected() {
        let unsigned = DataItemBuilder::new(&b"x"[..]).build();
        assert!(matches!(encode_bundle(&[unsigned]), Err(CoreError::NotSigned)));
    }

    #[test]
    fn test_id_mismatch_rejected() {
        let mut bundle = encode_bundle(&items()).unwrap();
        bundle[WORD + WORD] ^= 0xff;
        assert!(matches!(decode_bundle(&bundle), Err(CoreError::MalformedBundle(_))));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bundle = encode_bundle(&items()).unwrap();
        bundle.push(0);
        assert!(decode_bundle(&bundle).is_err());
    }

    #[test]
    fn test_nested_item_carries_bundle() {
        let inner = items();
        let signer = Ed25519Signer::from_secret_bytes(&[34u8; 32]);
        let outer = DataItemBuilder::nested(&inner).unwrap().sign(&signer).unwrap();

        verify(&outer).unwrap();
        assert_eq!(outer.tag("Bundle-Format"), Some(&b"binary"[..]));

        let unpacked = decode_bundle(outer.data()).unwrap();
        assert_eq!(unpacked.len(), 3);
        for (a, b) in unpacked.iter().zip(&inner) {
            assert_eq!(encode(a).unwrap(), encode(b).unwrap());
            verify(a).unwrap();
        }
    }
}
