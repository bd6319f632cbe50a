//! # upstage-parse
//!
//! Batch-upload document attachments to the Upstage document-parsing API.
//!
//! Every input item carries zero or more base64-encoded attachments. Each
//! attachment becomes one authenticated `multipart/form-data` POST, and the
//! run produces one [`ResultRecord`] per file, in input order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! items
//!  │
//!  ├─ 1. Credentials  resolve the API key once per run
//!  ├─ 2. Extract      select an item's attachments, decode base64
//!  ├─ 3. Params       resolve language / model / formats once per item
//!  ├─ 4. Multipart    frame parameters + file into a request body
//!  ├─ 5. Dispatch     POST with `Authorization: Bearer <key>`
//!  └─ 6. Output       one ResultRecord per file + run stats
//! ```
//!
//! Uploads are strictly sequential. With `continue_on_failure` a failed file
//! or item becomes a `success: false` record; otherwise the first failure
//! ends the run with that error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use upstage_parse::{run, Attachment, BatchConfig, EnvCredentials, InputItem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let item = InputItem::new()
//!         .with_attachment("data", Attachment::from_file("invoice.pdf").await?);
//!     let config = BatchConfig::builder().continue_on_failure(true).build()?;
//!
//!     // Reads UPSTAGE_API_KEY
//!     let output = run(&[item], &config, &EnvCredentials::default()).await?;
//!     for record in &output.records {
//!         println!("{}", serde_json::to_string(record)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Profiles
//!
//! | Profile | Endpoint | Fields |
//! |---------|----------|--------|
//! | `document-digitization` (default) | `https://api.upstage.ai/v1/document-digitization` | `model`, `output_formats`, `base64_encoding`, `ocr`, `coordinates`, `language`, `document` |
//! | `document-parsing` (legacy) | `https://console.upstage.ai/api/document-digitization/document-parsing` | `language`, `file` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `upstage-parse` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! upstage-parse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod credentials;
pub mod error;
pub mod item;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{run, run_batch, run_sync, run_to_file, write_records};
pub use config::{
    Base64Category, BatchConfig, BatchConfigBuilder, Language, OcrMode, OutputFormat, ParseOptions, Profile,
};
pub use credentials::{ApiKey, CredentialSource, EnvCredentials, API_KEY_ENV};
pub use error::{ConnectorError, ErrorKind};
pub use item::{load_items, Attachment, BinaryData, InputItem};
pub use output::{BatchOutput, BatchStats, ResultRecord};
pub use pipeline::dispatch::{Dispatch, HttpDispatcher, UploadRequest};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
