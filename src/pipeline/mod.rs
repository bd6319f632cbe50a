//! Pipeline stages for one attachment upload.
//!
//! Each submodule implements one step; the orchestrator in [`crate::batch`]
//! sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! item ──▶ extract ──▶ multipart ──▶ dispatch ──▶ ResultRecord
//!           (base64)   (+ params)     (HTTP)
//! ```
//!
//! 1. [`extract`]  : select an item's attachments and decode them
//! 2. [`params`]   : resolve the item's [`params::ParameterBag`] (once per item)
//! 3. [`multipart`]: frame parameters and file into a multipart body
//! 4. [`dispatch`] : authenticated POST; the only stage with network I/O

pub mod dispatch;
pub mod extract;
pub mod multipart;
pub mod params;
