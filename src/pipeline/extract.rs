//! Attachment extraction: pick an item's payloads and decode them to bytes.
//!
//! Decoding is lenient about layout (line breaks, missing `=` padding) since
//! upstream producers wrap base64 inconsistently, but strict about content:
//! a payload that is absent, undecodable or empty is an
//! [`ConnectorError::InvalidAttachment`].

use crate::error::ConnectorError;
use crate::item::{Attachment, InputItem};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// MIME type used when an attachment declares none.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension used for synthesised names when an attachment declares none.
pub const DEFAULT_EXTENSION: &str = "dat";

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static LAST_UPLOAD_STAMP: AtomicU64 = AtomicU64::new(0);

/// A decoded attachment, ready for the multipart builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Attachments of `item` to upload, in enumeration order.
///
/// With `binary_property` set only that attachment is returned.
pub fn select_attachments<'a>(
    item: &'a InputItem,
    index: usize,
    binary_property: Option<&str>,
) -> Result<Vec<(&'a str, &'a Attachment)>, ConnectorError> {
    let attachments = item.attachments();
    if attachments.is_empty() {
        return Err(ConnectorError::NoAttachments { item: index });
    }

    match binary_property {
        Some(name) => attachments
            .iter()
            .find(|(k, _)| k == name)
            .map(|(k, a)| vec![(k.as_str(), a)])
            .ok_or_else(|| ConnectorError::MissingAttachment {
                item: index,
                name: name.to_string(),
            }),
        None => Ok(attachments.iter().map(|(k, a)| (k.as_str(), a)).collect()),
    }
}

/// Decode one attachment, resolving its file name and MIME type.
pub fn decode_attachment(key: &str, attachment: &Attachment) -> Result<DecodedAttachment, ConnectorError> {
    let encoded = attachment
        .encoded_data
        .as_deref()
        .ok_or_else(|| ConnectorError::InvalidAttachment {
            key: key.to_string(),
            reason: "missing \"data\" property".into(),
        })?;

    let bytes = decode_base64(encoded).map_err(|e| ConnectorError::InvalidAttachment {
        key: key.to_string(),
        reason: format!("not valid base64: {e}"),
    })?;
    if bytes.is_empty() {
        return Err(ConnectorError::InvalidAttachment {
            key: key.to_string(),
            reason: "decoded content is empty".into(),
        });
    }

    let file_name = attachment
        .file_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_file_name(attachment.file_extension.as_deref()));
    let mime_type = attachment
        .mime_type
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string();

    debug!(key, file = %file_name, mime = %mime_type, bytes = bytes.len(), "Decoded attachment");

    Ok(DecodedAttachment {
        file_name,
        mime_type,
        bytes,
    })
}

/// Decode base64, ignoring ASCII whitespace and missing padding.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        LENIENT.decode(compact)
    } else {
        LENIENT.decode(encoded)
    }
}

/// `upload-<stamp>.<ext>`, unique for the lifetime of the process.
pub fn default_file_name(extension: Option<&str>) -> String {
    let ext = extension
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_EXTENSION);
    format!("upload-{}.{}", next_upload_stamp(), ext)
}

/// Milliseconds since the epoch, bumped so no two calls return the same value.
fn next_upload_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut prev = LAST_UPLOAD_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_UPLOAD_STAMP.compare_exchange_weak(prev, next, Ordering::SeqCst, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use std::collections::HashSet;

    #[test]
    fn decode_round_trips_arbitrary_bytes() {
        let samples: [&[u8]; 4] = [b"%PDF-1.7\n", &[0u8, 255, 128, 10, 13], b"a", &[7u8; 1025]];
        for original in samples {
            let att = Attachment {
                encoded_data: Some(STANDARD.encode(original)),
                ..Attachment::default()
            };
            let decoded = decode_attachment("data", &att).unwrap();
            assert_eq!(decoded.bytes, original);
        }
    }

    #[test]
    fn decode_tolerates_line_breaks_and_missing_padding() {
        assert_eq!(decode_base64("aGVs\nbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64("aGVsbG8").unwrap(), b"hello");
    }

    #[test]
    fn missing_data_is_invalid() {
        let err = decode_attachment("doc", &Attachment::default()).unwrap_err();
        match err {
            ConnectorError::InvalidAttachment { key, reason } => {
                assert_eq!(key, "doc");
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_payload_is_invalid() {
        let att = Attachment {
            encoded_data: Some(String::new()),
            ..Attachment::default()
        };
        let err = decode_attachment("doc", &att).unwrap_err();
        assert!(err.to_string().contains("empty"), "got: {err}");
    }

    #[test]
    fn garbage_payload_is_invalid() {
        let att = Attachment {
            encoded_data: Some("***not base64***".into()),
            ..Attachment::default()
        };
        assert!(matches!(
            decode_attachment("doc", &att),
            Err(ConnectorError::InvalidAttachment { .. })
        ));
    }

    #[test]
    fn declared_name_and_mime_are_kept() {
        let att = Attachment::from_bytes(b"x")
            .with_file_name("scan.png")
            .with_mime_type("image/png");
        let decoded = decode_attachment("data", &att).unwrap();
        assert_eq!(decoded.file_name, "scan.png");
        assert_eq!(decoded.mime_type, "image/png");
    }

    #[test]
    fn defaults_applied_when_absent() {
        let decoded = decode_attachment("data", &Attachment::from_bytes(b"x")).unwrap();
        assert!(decoded.file_name.starts_with("upload-"));
        assert!(decoded.file_name.ends_with(".dat"));
        assert_eq!(decoded.mime_type, DEFAULT_MIME_TYPE);

        let decoded =
            decode_attachment("data", &Attachment::from_bytes(b"x").with_file_extension("pdf")).unwrap();
        assert!(decoded.file_name.ends_with(".pdf"));
    }

    #[test]
    fn synthesised_names_are_unique() {
        let names: HashSet<String> = (0..500).map(|_| default_file_name(Some("pdf"))).collect();
        assert_eq!(names.len(), 500);
    }

    #[test]
    fn select_all_in_order() {
        let item = InputItem::new()
            .with_attachment("b", Attachment::from_bytes(b"1"))
            .with_attachment("a", Attachment::from_bytes(b"2"));
        let keys: Vec<&str> = select_attachments(&item, 0, None)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn select_named_property() {
        let item = InputItem::new()
            .with_attachment("b", Attachment::from_bytes(b"1"))
            .with_attachment("a", Attachment::from_bytes(b"2"));
        let picked = select_attachments(&item, 0, Some("a")).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].0, "a");

        let err = select_attachments(&item, 3, Some("c")).unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::MissingAttachment { item: 3, ref name } if name == "c"
        ));
    }

    #[test]
    fn select_on_empty_item() {
        let err = select_attachments(&InputItem::new(), 5, Some("data")).unwrap_err();
        assert!(matches!(err, ConnectorError::NoAttachments { item: 5 }));
    }
}
