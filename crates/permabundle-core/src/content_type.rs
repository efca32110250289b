//! Payload sniffing for the `Content-Type` tag.

use crate::tags::Tag;

/// Name of the tag gateways read to serve a payload.
pub const CONTENT_TYPE_TAG: &str = "Content-Type";

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Guess a MIME type from the leading bytes of a payload.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
        (b"OggS", "application/ogg"),
        (b"\x00asm", "application/wasm"),
    ];

    for (magic, mime) in SIGNATURES {
        if data.starts_with(magic) {
            return mime;
        }
    }

    if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return "image/webp";
    }

    let head = &data[..data.len().min(512)];
    let trimmed = trim_leading_whitespace(head);
    if starts_with_ignore_case(trimmed, b"<!doctype html") || starts_with_ignore_case(trimmed, b"<html") {
        return "text/html; charset=utf-8";
    }

    if looks_like_text(head) {
        return TEXT_PLAIN;
    }

    OCTET_STREAM
}

/// Append a sniffed `Content-Type` tag unless the caller already supplied one.
pub fn ensure_content_type(tags: &mut Vec<Tag>, data: &[u8]) {
    let present = tags
        .iter()
        .any(|t| t.name.eq_ignore_ascii_case(CONTENT_TYPE_TAG.as_bytes()));
    if !present {
        tags.push(Tag::new(CONTENT_TYPE_TAG, detect_content_type(data)));
    }
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    &data[start..]
}

fn starts_with_ignore_case(data: &[u8], prefix: &[u8]) -> bool {
    data.len() >= prefix.len() && data[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn looks_like_text(head: &[u8]) -> bool {
    // A multi-byte sequence may be cut at the 512-byte boundary.
    let valid = match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none(),
    };
    valid
        && head
            .iter()
            .all(|&b| b >= 0x20 || matches!(b, b'\t' | b'\n' | b'\r' | 0x0c | 0x1b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_images() {
        assert_eq!(detect_content_type(b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(detect_content_type(b"\xff\xd8\xff\xe0"), "image/jpeg");
        assert_eq!(detect_content_type(b"GIF89a..."), "image/gif");
        assert_eq!(detect_content_type(b"RIFF\0\0\0\0WEBPVP8 "), "image/webp");
    }

    #[test]
    fn test_detects_text_and_html() {
        assert_eq!(detect_content_type(b"hello world\n"), TEXT_PLAIN);
        assert_eq!(
            detect_content_type(b"  <!DOCTYPE HTML><html></html>"),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn test_binary_falls_back_to_octet_stream() {
        assert_eq!(detect_content_type(&[0u8, 1, 2, 3, 250]), OCTET_STREAM);
    }

    #[test]
    fn test_ensure_content_type_respects_caller_tag() {
        let mut tags = vec![Tag::new("content-type", "application/json")];
        ensure_content_type(&mut tags, b"{}");
        assert_eq!(tags.len(), 1);

        let mut tags = vec![Tag::new("App-Name", "demo")];
        ensure_content_type(&mut tags, b"plain");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[1].value, TEXT_PLAIN.as_bytes());
    }
}
