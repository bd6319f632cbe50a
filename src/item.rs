//! Input items and their binary attachments.
//!
//! Items use the same JSON shape as workflow-engine items:
//!
//! ```json
//! {
//!   "binary": {
//!     "invoice": { "data": "JVBERi0…", "fileName": "invoice.pdf", "mimeType": "application/pdf" },
//!     "receipt": { "data": "iVBORw0…", "fileExtension": "png" }
//!   },
//!   "options": { "language": "en" }
//! }
//! ```
//!
//! The `binary` object is kept as an explicit ordered list, in document
//! order, so attachments are always uploaded in the order they were written.

use crate::config::ParseOptions;
use crate::error::ConnectorError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// One unit of input to a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputItem {
    /// Named binary payloads. `null` and a missing key both mean "none".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryData>,

    /// Per-item parse option overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ParseOptions>,
}

impl InputItem {
    /// An item without attachments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a named attachment.
    pub fn with_attachment(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.binary
            .get_or_insert_with(BinaryData::default)
            .insert(name, attachment);
        self
    }

    /// Set per-item option overrides.
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Attachments in enumeration order; empty when the item has none.
    pub fn attachments(&self) -> &[(String, Attachment)] {
        self.binary.as_ref().map_or(&[], |b| b.as_slice())
    }
}

/// One binary payload as carried on an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Base64-encoded file content.
    #[serde(rename = "data", alias = "encodedData", default)]
    pub encoded_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl Attachment {
    /// Wrap raw bytes, base64-encoding them.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            encoded_data: Some(STANDARD.encode(bytes)),
            ..Self::default()
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_file_extension(mut self, ext: impl Into<String>) -> Self {
        self.file_extension = Some(ext.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Read a local document, inferring file name, extension and MIME type.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConnectorError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ConnectorError::InputRead {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut attachment = Self::from_bytes(&bytes);
        attachment.file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);
        attachment.file_extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        attachment.mime_type = attachment
            .file_extension
            .as_deref()
            .and_then(mime_for_extension)
            .map(str::to_string);
        Ok(attachment)
    }
}

/// MIME type for document extensions the parsing service accepts.
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "hwp" => "application/x-hwp",
        "hwpx" => "application/haansofthwpx",
        _ => return None,
    };
    Some(mime)
}

/// Ordered mapping from attachment name to [`Attachment`]. Names are unique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryData(Vec<(String, Attachment)>);

impl BinaryData {
    /// Insert an attachment; an existing entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, attachment: Attachment) -> Option<Attachment> {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, attachment)),
            None => {
                self.0.push((name, attachment));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attachment> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, a)| a)
    }

    pub fn as_slice(&self) -> &[(String, Attachment)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Attachment)> for BinaryData {
    fn from_iter<I: IntoIterator<Item = (K, Attachment)>>(iter: I) -> Self {
        let mut data = Self::default();
        for (name, attachment) in iter {
            data.insert(name, attachment);
        }
        data
    }
}

impl Serialize for BinaryData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, attachment) in &self.0 {
            map.serialize_entry(name, attachment)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BinaryData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BinaryDataVisitor;

        impl<'de> Visitor<'de> for BinaryDataVisitor {
            type Value = BinaryData;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of binary property names to attachments")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, Attachment)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, attachment)) = access.next_entry::<String, Attachment>()? {
                    if entries.iter().any(|(k, _)| *k == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate binary property \"{name}\""
                        )));
                    }
                    entries.push((name, attachment));
                }
                Ok(BinaryData(entries))
            }
        }

        deserializer.deserialize_map(BinaryDataVisitor)
    }
}

/// Load items from a JSON document: an array of items or a single item.
pub async fn load_items(path: impl AsRef<Path>) -> Result<Vec<InputItem>, ConnectorError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConnectorError::InputRead {
            path: path.to_path_buf(),
            source: e,
        })?;
    parse_items(&text).map_err(|reason| ConnectorError::InvalidInput {
        source_name: path.display().to_string(),
        reason,
    })
}

/// Parse a JSON items document (see [`load_items`]).
pub fn parse_items(text: &str) -> Result<Vec<InputItem>, String> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ItemsDocument {
        Many(Vec<InputItem>),
        One(InputItem),
    }

    match serde_json::from_str::<ItemsDocument>(text) {
        Ok(ItemsDocument::Many(items)) => Ok(items),
        Ok(ItemsDocument::One(item)) => Ok(vec![item]),
        // The untagged error hides the real cause; retry as an array to surface it.
        Err(_) => serde_json::from_str::<Vec<InputItem>>(text).map_err(|e| e.to_string()),
    }
}
