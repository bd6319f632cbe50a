//! Error types for the upstage-parse library.
//!
//! A single [`ConnectorError`] enum covers every way a batch run can fail.
//! Whether a given error is *fatal* depends on where it happens and on the
//! continue-on-failure policy:
//!
//! * Credential and configuration errors are always fatal: nothing can be
//!   uploaded without them.
//!
//! * Item- and attachment-level errors ([`ConnectorError::NoAttachments`],
//!   [`ConnectorError::InvalidAttachment`], [`ConnectorError::Remote`], …)
//!   are caught by the orchestrator. With continue-on-failure enabled they
//!   become a failed [`crate::output::ResultRecord`]; otherwise they are
//!   returned unchanged and the run stops.
//!
//! [`ErrorKind`] is the serialisable tag stored on failed records so hosts can
//! branch on the failure class without parsing messages.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the upstage-parse library.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // ── Item / attachment errors ──────────────────────────────────────────
    /// The item carries no binary payloads at all.
    #[error("No binary data found on item {item}.")]
    NoAttachments { item: usize },

    /// A specifically named binary property was requested but is absent.
    #[error("Item {item} has no binary property named \"{name}\".")]
    MissingAttachment { item: usize, name: String },

    /// The payload is present but missing, empty or not valid base64.
    #[error("Binary data \"{key}\" is invalid: {reason}")]
    InvalidAttachment { key: String, reason: String },

    // ── Remote endpoint errors ────────────────────────────────────────────
    /// The endpoint could not be reached, or the response body could not be read.
    #[error("Request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The endpoint answered with a non-success status.
    #[error("Request failed with status code {status}: {body}")]
    Remote { status: u16, body: String },

    // ── Credential errors ─────────────────────────────────────────────────
    /// No API key is available.
    #[error("Upstage API key is not configured.\n{hint}")]
    MissingCredential { hint: String },

    // ── Input / output errors ─────────────────────────────────────────────
    /// The items document could not be parsed.
    #[error("Invalid input '{source_name}': {reason}")]
    InvalidInput { source_name: String, reason: String },

    /// A document or items file could not be read.
    #[error("Failed to read '{path}': {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the JSON results file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    /// The failure class, as recorded on failed result records.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::NoAttachments { .. } => ErrorKind::NoAttachments,
            ConnectorError::MissingAttachment { .. } => ErrorKind::MissingAttachment,
            ConnectorError::InvalidAttachment { .. } => ErrorKind::InvalidAttachment,
            ConnectorError::Transport { .. } => ErrorKind::Transport,
            ConnectorError::Remote { .. } => ErrorKind::Remote,
            ConnectorError::MissingCredential { .. } => ErrorKind::Credential,
            ConnectorError::InvalidInput { .. }
            | ConnectorError::InputRead { .. }
            | ConnectorError::OutputWriteFailed { .. } => ErrorKind::Io,
            ConnectorError::InvalidConfig(_) => ErrorKind::Config,
            ConnectorError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status of a [`ConnectorError::Remote`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConnectorError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Serialisable failure class attached to failed result records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoAttachments,
    MissingAttachment,
    InvalidAttachment,
    Transport,
    Remote,
    Credential,
    Io,
    Config,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_attachments_display() {
        let e = ConnectorError::NoAttachments { item: 2 };
        assert_eq!(e.to_string(), "No binary data found on item 2.");
        assert_eq!(e.kind(), ErrorKind::NoAttachments);
    }

    #[test]
    fn remote_display_carries_status_and_body() {
        let e = ConnectorError::Remote {
            status: 401,
            body: r#"{"error":"invalid key"}"#.into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("401"), "got: {msg}");
        assert!(msg.contains("invalid key"), "got: {msg}");
        assert_eq!(e.status(), Some(401));
    }

    #[test]
    fn status_is_none_for_non_remote() {
        let e = ConnectorError::Transport {
            url: "http://localhost".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(e.status(), None);
        assert_eq!(e.kind(), ErrorKind::Transport);
    }

    #[test]
    fn missing_attachment_names_property() {
        let e = ConnectorError::MissingAttachment {
            item: 0,
            name: "invoice".into(),
        };
        assert!(e.to_string().contains("\"invoice\""));
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::InvalidAttachment).unwrap();
        assert_eq!(json, "\"invalid_attachment\"");
    }
}
