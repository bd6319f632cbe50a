//! multipart/form-data body assembly.
//!
//! The body is assembled by hand with an explicit boundary so that the exact
//! bytes sent are known before dispatch: each field is framed as
//!
//! ```text
//! --BOUNDARY\r\n
//! Content-Disposition: form-data; name="<field>"[; filename="<name>"]\r\n
//! [Content-Type: <mime>\r\n]
//! \r\n
//! <value or raw bytes>\r\n
//! ```
//!
//! and the body ends with `--BOUNDARY--\r\n`. Scalar fields come first and
//! the file field last.

use crate::config::Profile;
use crate::pipeline::extract::DecodedAttachment;
use crate::pipeline::params::ParameterBag;

const BOUNDARY_PREFIX: &str = "----UpstageFormBoundary";

/// A finished multipart body and the boundary it was framed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody {
    boundary: String,
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the `Content-Type` request header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Incremental multipart writer.
#[derive(Debug)]
pub struct MultipartBuilder {
    boundary: String,
    buf: Vec<u8>,
}

impl Default for MultipartBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBuilder {
    /// A builder with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(format!("{BOUNDARY_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    /// A builder with a caller-chosen boundary. The boundary must not occur in
    /// any field value.
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Append a text field.
    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.open_part(name, None, None);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    /// Append a file field carrying `bytes` verbatim.
    pub fn file(mut self, name: &str, file_name: &str, mime_type: &str, bytes: &[u8]) -> Self {
        self.open_part(name, Some(file_name), Some(mime_type));
        self.buf.reserve(bytes.len() + 2);
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    /// Write the closing delimiter.
    pub fn finish(mut self) -> MultipartBody {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");
        MultipartBody {
            boundary: self.boundary,
            bytes: self.buf,
        }
    }

    fn open_part(&mut self, name: &str, file_name: Option<&str>, mime_type: Option<&str>) {
        let mut head = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"",
            self.boundary,
            escape_quoted(name)
        );
        if let Some(file_name) = file_name {
            head.push_str(&format!("; filename=\"{}\"", escape_quoted(file_name)));
        }
        head.push_str("\r\n");
        if let Some(mime) = mime_type {
            head.push_str(&format!("Content-Type: {}\r\n", strip_line_breaks(mime)));
        }
        head.push_str("\r\n");
        self.buf.extend_from_slice(head.as_bytes());
    }
}

/// Percent-escape the characters that would break a quoted header parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// Build the upload body for one attachment under the given profile.
///
/// Digitization: `output_formats`, `base64_encoding`, `ocr`, `coordinates`,
/// `language`, `model`, then `document`. Legacy: `language`, then `file`.
pub fn build_body(profile: Profile, params: &ParameterBag, document: &DecodedAttachment) -> MultipartBody {
    let builder = MultipartBuilder::new();
    let builder = match profile {
        Profile::DocumentDigitization => builder
            .text("output_formats", &params.output_formats_json())
            .text("base64_encoding", &params.base64_encoding_json())
            .text("ocr", params.ocr.as_str())
            .text("coordinates", if params.coordinates { "true" } else { "false" })
            .text("language", params.language.as_str())
            .text("model", &params.model),
        Profile::LegacyDocumentParsing => builder.text("language", params.language.as_str()),
    };
    builder
        .file(
            profile.document_field(),
            &document.file_name,
            &document.mime_type,
            &document.bytes,
        )
        .finish()
}
