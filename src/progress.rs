//! Progress-callback trait for per-file batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! at the same points the orchestrator emits its `tracing` events: batch
//! start/end, per-file start, per-file success or failure.
//!
//! Callbacks are purely observational. Leaving the callback unset (or
//! filtering out the `upstage_parse` tracing target) never changes which
//! records a run produces.
//!
//! # Example
//!
//! ```rust
//! use upstage_parse::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     uploaded: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, item_index: usize, binary_property: &str, file_name: &str) {
//!         self.uploaded.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("item {item_index}: {binary_property} ({file_name}) uploaded");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { uploaded: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::BatchStats;
use std::sync::Arc;

/// Called by the orchestrator as it processes each item and file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Events arrive in processing order; a run never has
/// two files in flight.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after credentials resolved, before the first item.
    fn on_batch_start(&self, total_items: usize) {
        let _ = total_items;
    }

    /// Called before a file is decoded and uploaded.
    fn on_file_start(&self, item_index: usize, binary_property: &str) {
        let _ = (item_index, binary_property);
    }

    /// Called when the endpoint accepted a file.
    fn on_file_complete(&self, item_index: usize, binary_property: &str, file_name: &str) {
        let _ = (item_index, binary_property, file_name);
    }

    /// Called when a file, or a whole item, failed.
    ///
    /// `binary_property` is `None` for item-level failures that cannot be
    /// attributed to one attachment (an item with no binary data).
    fn on_file_error(&self, item_index: usize, binary_property: Option<&str>, error: &str) {
        let _ = (item_index, binary_property, error);
    }

    /// Called once after the last item, only when the run was not aborted.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
