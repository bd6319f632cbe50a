//! Output types: one [`ResultRecord`] per uploaded file (or per failed item).

use crate::error::{ConnectorError, ErrorKind};
use serde::{Deserialize, Serialize};

/// The complete result of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutput {
    /// Records in processing order: items in input order, then attachments
    /// in enumeration order.
    pub records: Vec<ResultRecord>,
    pub stats: BatchStats,
}

impl BatchOutput {
    /// Records of files the endpoint accepted.
    pub fn successes(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter().filter(|r| r.success)
    }

    /// Records of failed files and items.
    pub fn failures(&self) -> impl Iterator<Item = &ResultRecord> {
        self.records.iter().filter(|r| !r.success)
    }
}

/// Counters for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Items in the input.
    pub total_items: usize,
    /// Files the endpoint accepted.
    pub uploaded_files: usize,
    /// Files that failed to decode or upload.
    pub failed_files: usize,
    /// Items that failed before any file was attempted.
    pub failed_items: usize,
    /// Wall-clock duration of the run, including credential resolution.
    pub duration_ms: u64,
}

/// One unit of pipeline output.
///
/// Three shapes exist:
/// * uploaded: `success: true` with `binaryProperty`, `file` and `result`;
/// * file failure: `success: false` with `binaryProperty`, `error`,
///   `errorKind` and `file` when the name was already resolved;
/// * item failure: `success: false` without `file`; `binaryProperty` is set
///   only when a specific property was requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub success: bool,
    pub item_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Parsed response, passed through verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ResultRecord {
    pub fn uploaded(
        item_index: usize,
        binary_property: impl Into<String>,
        file: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self {
            success: true,
            item_index,
            binary_property: Some(binary_property.into()),
            file: Some(file.into()),
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn file_failed(
        item_index: usize,
        binary_property: impl Into<String>,
        file: Option<String>,
        error: &ConnectorError,
    ) -> Self {
        Self {
            success: false,
            item_index,
            binary_property: Some(binary_property.into()),
            file,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn item_failed(item_index: usize, binary_property: Option<String>, error: &ConnectorError) -> Self {
        Self {
            success: false,
            item_index,
            binary_property,
            file: None,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }
}
