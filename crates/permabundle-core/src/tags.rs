//! Tags: ordered name/value metadata pairs and their wire serialization.
//!
//! Tags are serialized with the network's Avro encoding of
//! `array<record { name: bytes, value: bytes }>`:
//!
//! ```text
//! block   := count:zigzag-varint  [byte_size:zigzag-varint if count < 0]  tag*
//! tag     := len:zigzag-varint name  len:zigzag-varint value
//! array   := block* 0
//! ```
//!
//! An empty tag list serializes to zero bytes (not to a lone terminator).

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Tag limits enforced at verification time.
pub mod limits {
    /// Maximum number of tags on one item.
    pub const MAX_TAGS: usize = 128;
    /// Maximum tag name length in bytes.
    pub const MAX_NAME_LEN: usize = 1024;
    /// Maximum tag value length in bytes.
    pub const MAX_VALUE_LEN: usize = 3072;
    /// Maximum length of the serialized tag block.
    pub const MAX_TAG_BYTES: usize = 4096;
}

/// A name/value metadata pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Name as UTF-8, if it is valid UTF-8.
    pub fn name_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.name).ok()
    }

    /// Value as UTF-8, if it is valid UTF-8.
    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Serialize tags to their wire form.
pub fn serialize_tags(tags: &[Tag]) -> Vec<u8> {
    if tags.is_empty() {
        return Vec::new();
    }

    let capacity = tags
        .iter()
        .map(|t| t.name.len() + t.value.len() + 4)
        .sum::<usize>()
        + 4;
    let mut buf = Vec::with_capacity(capacity);

    write_long(&mut buf, tags.len() as i64);
    for tag in tags {
        write_bytes(&mut buf, &tag.name);
        write_bytes(&mut buf, &tag.value);
    }
    write_long(&mut buf, 0);
    buf
}

/// Parse the wire form back into tags.
pub fn deserialize_tags(bytes: &[u8]) -> Result<Vec<Tag>, CoreError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = AvroReader { buf: bytes, pos: 0 };
    let mut tags = Vec::new();

    loop {
        let mut count = reader.read_long()?;
        if count == 0 {
            break;
        }
        if count < 0 {
            count = count
                .checked_neg()
                .ok_or_else(|| CoreError::MalformedTags("block count overflow".into()))?;
            // Block byte size, only used by readers that skip blocks.
            reader.read_long()?;
        }

        let count = count as u64;
        // Every tag takes at least two bytes (two length prefixes).
        if count > (reader.remaining() / 2) as u64 {
            return Err(CoreError::MalformedTags(format!(
                "block declares {} tags but only {} bytes remain",
                count,
                reader.remaining()
            )));
        }

        for _ in 0..count {
            let name = reader.read_bytes()?.to_vec();
            let value = reader.read_bytes()?.to_vec();
            tags.push(Tag { name, value });
        }
    }

    if reader.remaining() != 0 {
        return Err(CoreError::MalformedTags(format!(
            "{} trailing bytes after tag array",
            reader.remaining()
        )));
    }

    Ok(tags)
}

fn write_long(buf: &mut Vec<u8>, n: i64) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    loop {
        if z & !0x7f == 0 {
            buf.push(z as u8);
            return;
        }
        buf.push(((z & 0x7f) | 0x80) as u8);
        z >>= 7;
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_long(buf, bytes.len() as i64);
    buf.extend_from_slice(bytes);
}

struct AvroReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AvroReader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_long(&mut self) -> Result<i64, CoreError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| CoreError::MalformedTags("unterminated varint".into()))?;
            self.pos += 1;

            if shift >= 64 {
                return Err(CoreError::MalformedTags("varint too long".into()));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(((value >> 1) as i64) ^ -((value & 1) as i64))
    }

    fn read_bytes(&mut self) -> Result<&'a [u8], CoreError> {
        let len = self.read_long()?;
        if len < 0 {
            return Err(CoreError::MalformedTags(format!("negative length {}", len)));
        }
        let len = len as usize;
        if len > self.remaining() {
            return Err(CoreError::MalformedTags(format!(
                "length {} exceeds remaining {} bytes",
                len,
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tags_serialize_to_nothing() {
        assert!(serialize_tags(&[]).is_empty());
        assert!(deserialize_tags(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_single_tag_layout() {
        let bytes = serialize_tags(&[Tag::new("a", "bc")]);
        // count 1 -> 0x02, len 1 -> 0x02, 'a', len 2 -> 0x04, 'b', 'c', terminator 0
        assert_eq!(bytes, vec![0x02, 0x02, b'a', 0x04, b'b', b'c', 0x00]);
    }

    #[test]
    fn test_multibyte_varint() {
        let long_value = vec![b'v'; 100];
        let bytes = serialize_tags(&[Tag::new("n", long_value.clone())]);
        // 100 zigzags to 200 = 0xc8 0x01
        assert_eq!(&bytes[3..5], &[0xc8, 0x01]);
        let tags = deserialize_tags(&bytes).unwrap();
        assert_eq!(tags[0].value, long_value);
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let tags = vec![
            Tag::new("Content-Type", "text/plain"),
            Tag::new("App-Name", "demo"),
            Tag::new("App-Name", "duplicate names are allowed"),
        ];
        let parsed = deserialize_tags(&serialize_tags(&tags)).unwrap();
        assert_eq!(parsed, tags);
    }

    #[test]
    fn test_negative_block_count_accepted() {
        // count -1 (zigzag 0x01), block size 4 (0x08), tag "a"="b", terminator
        let bytes = vec![0x01, 0x08, 0x02, b'a', 0x02, b'b', 0x00];
        let tags = deserialize_tags(&bytes).unwrap();
        assert_eq!(tags, vec![Tag::new("a", "b")]);
    }

    #[test]
    fn test_multiple_blocks() {
        let bytes = vec![0x02, 0x02, b'a', 0x02, b'b', 0x02, 0x02, b'c', 0x02, b'd', 0x00];
        let tags = deserialize_tags(&bytes).unwrap();
        assert_eq!(tags, vec![Tag::new("a", "b"), Tag::new("c", "d")]);
    }

    #[test]
    fn test_truncated_value_rejected() {
        let mut bytes = serialize_tags(&[Tag::new("name", "value")]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            deserialize_tags(&bytes),
            Err(CoreError::MalformedTags(_))
        ));
    }

    #[test]
    fn test_missing_terminator_rejected() {
        let mut bytes = serialize_tags(&[Tag::new("n", "v")]);
        bytes.pop();
        assert!(deserialize_tags(&bytes).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = serialize_tags(&[Tag::new("n", "v")]);
        bytes.push(0x00);
        assert!(deserialize_tags(&bytes).is_err());
    }

    #[test]
    fn test_absurd_count_rejected() {
        // count 1_000_000 with nothing behind it
        let mut bytes = Vec::new();
        write_long(&mut bytes, 1_000_000);
        assert!(deserialize_tags(&bytes).is_err());
    }
}
