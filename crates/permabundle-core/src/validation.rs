//! Data item verification: structural limits and signature check.

use crate::data_item::{DataItem, ADDRESS_LEN};
use crate::error::{TagField, ValidationError};
use crate::signer::verifier_for;
use crate::tags::limits::{MAX_NAME_LEN, MAX_TAGS, MAX_TAG_BYTES, MAX_VALUE_LEN};
use crate::types::DataItemId;

/// Fully verify a signed item.
///
/// Checks run in a fixed order and the first violation is returned:
/// - signed, id matches the signature
/// - anchor, then target, absent or 32 bytes
/// - tag count, per-tag bounds, serialized tag size
/// - signature over the recomputed deep hash
pub fn verify(item: &DataItem) -> Result<(), ValidationError> {
    verify_structure(item)?;

    let (Some(kind), Some(owner), Some(signature)) =
        (item.signature_type(), item.owner(), item.signature())
    else {
        return Err(ValidationError::NotSigned);
    };

    let verifier = verifier_for(kind.to_u16(), owner)?;
    let message = item
        .signing_message()
        .map_err(|_| ValidationError::NotSigned)?;
    verifier.verify(message.as_bytes(), signature)?;

    Ok(())
}

/// Verify everything except the signature itself.
pub fn verify_structure(item: &DataItem) -> Result<(), ValidationError> {
    let (Some(id), Some(signature)) = (item.id(), item.signature()) else {
        return Err(ValidationError::NotSigned);
    };
    if DataItemId::from_signature(signature) != id {
        return Err(ValidationError::IdMismatch);
    }

    if let Some(anchor) = item.anchor() {
        if anchor.len() != ADDRESS_LEN {
            return Err(ValidationError::BadAnchorLength(anchor.len()));
        }
    }
    if let Some(target) = item.target() {
        if target.len() != ADDRESS_LEN {
            return Err(ValidationError::BadTargetLength(target.len()));
        }
    }

    let tags = item.tags();
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::TooManyTags {
            count: tags.len(),
            max: MAX_TAGS,
        });
    }

    for (index, tag) in tags.iter().enumerate() {
        check_tag_field(index, TagField::Name, &tag.name, MAX_NAME_LEN)?;
        check_tag_field(index, TagField::Value, &tag.value, MAX_VALUE_LEN)?;
    }

    let tags_len = item.tags_bytes().len();
    if tags_len > MAX_TAG_BYTES {
        return Err(ValidationError::TagBytesTooLarge {
            len: tags_len,
            max: MAX_TAG_BYTES,
        });
    }

    Ok(())
}

fn check_tag_field(
    index: usize,
    field: TagField,
    bytes: &[u8],
    max: usize,
) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::EmptyTag { index, field });
    }
    if bytes.len() > max {
        return Err(ValidationError::TagTooLong {
            index,
            field,
            len: bytes.len(),
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use crate::data_item::{DataItemBuilder, SignedParts};
    use crate::signer::{Ed25519Signer, EthereumSigner, Signer};
    use crate::tags::Tag;

    fn signer() -> Ed25519Signer {
        Ed25519Signer::from_secret_bytes(&[21u8; 32])
    }

    #[test]
    fn test_valid_item() {
        let item = DataItemBuilder::new(&b"hello"[..])
            .tag("Content-Type", "text/plain")
            .target([1u8; 32])
            .anchor([2u8; 32])
            .sign(&signer())
            .unwrap();
        verify(&item).unwrap();
        verify(&decode(&encode(&item).unwrap()).unwrap()).unwrap();
    }

    #[test]
    fn test_unsigned_item() {
        let item = DataItemBuilder::new(&b"x"[..]).build();
        assert!(matches!(verify(&item), Err(ValidationError::NotSigned)));
    }

    #[test]
    fn test_id_mismatch() {
        let item = DataItemBuilder::new(&b"x"[..]).sign(&signer()).unwrap();
        let forged = DataItem::from_signed_parts(SignedParts {
            signature_type: item.signature_type().unwrap(),
            owner: item.owner().unwrap().to_vec(),
            signature: item.signature().unwrap().to_vec(),
            id: DataItemId::from_bytes([0u8; 32]),
            target: Vec::new(),
            anchor: Vec::new(),
            tags: Vec::new(),
            data: item.data().clone(),
        });
        assert!(matches!(verify(&forged), Err(ValidationError::IdMismatch)));
    }

    #[test]
    fn test_too_many_tags() {
        let tags = (0..129).map(|i| Tag::new(format!("n{}", i), "v"));
        let item = DataItemBuilder::new(&b"x"[..]).tags(tags).sign(&signer()).unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::TooManyTags { count: 129, max: 128 })
        ));
    }

    #[test]
    fn test_name_too_long() {
        let item = DataItemBuilder::new(&b"x"[..])
            .tag(vec![b'n'; 1025], "v")
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::TagTooLong {
                index: 0,
                field: TagField::Name,
                len: 1025,
                max: 1024
            })
        ));
    }

    #[test]
    fn test_value_too_long() {
        let item = DataItemBuilder::new(&b"x"[..])
            .tag("ok", "v")
            .tag("n", vec![b'v'; 3073])
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::TagTooLong {
                index: 1,
                field: TagField::Value,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_tag_value() {
        let item = DataItemBuilder::new(&b"x"[..])
            .tag("n", "")
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::EmptyTag {
                index: 0,
                field: TagField::Value
            })
        ));
    }

    #[test]
    fn test_tag_bytes_too_large() {
        // Two tags each within bounds, together over 4096 serialized bytes.
        let item = DataItemBuilder::new(&b"x"[..])
            .tag("a", vec![b'v'; 3000])
            .tag("b", vec![b'v'; 3000])
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::TagBytesTooLarge { max: 4096, .. })
        ));
    }

    #[test]
    fn test_anchor_wrong_length() {
        let item = DataItemBuilder::new(&b"x"[..])
            .anchor(vec![0u8; 31])
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::BadAnchorLength(31))
        ));
    }

    #[test]
    fn test_target_wrong_length() {
        let item = DataItemBuilder::new(&b"x"[..])
            .target(vec![0u8; 33])
            .sign(&signer())
            .unwrap();
        assert!(matches!(
            verify(&item),
            Err(ValidationError::BadTargetLength(33))
        ));
    }

    #[test]
    fn test_flipped_signature_bit() {
        let item = DataItemBuilder::new(&b"payload"[..])
            .tag("k", "v")
            .sign(&signer())
            .unwrap();
        let mut bytes = encode(&item).unwrap();
        bytes[2] ^= 0x01;

        let decoded = decode(&bytes).unwrap();
        assert!(matches!(
            verify(&decoded),
            Err(ValidationError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let eth = EthereumSigner::generate();
        let item = DataItemBuilder::new(&b"payload"[..]).sign(&eth).unwrap();
        let mut bytes = encode(&item).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.owner(), Some(eth.owner()));
        assert!(matches!(
            verify(&decoded),
            Err(ValidationError::SignatureMismatch)
        ));
    }
}
