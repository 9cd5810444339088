//! Progress-callback trait for per-chunk review events.
//!
//! Inject an [`Arc<dyn ReviewProgressCallback>`] via
//! [`crate::config::ReviewConfigBuilder::progress_callback`] to observe a run
//! as chunks are sent and answered. The CLI drives its progress bar from it.
//!
//! # Example
//!
//! ```rust
//! use tabreview::{ReviewConfig, ReviewProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountFindings(AtomicUsize);
//!
//! impl ReviewProgressCallback for CountFindings {
//!     fn on_chunk_complete(&self, _chunk: usize, _total: usize, findings: usize) {
//!         self.0.fetch_add(findings, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ReviewConfig::builder()
//!     .progress_callback(Arc::new(CountFindings(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the orchestrator as it reviews each chunk.
///
/// Chunks are reviewed concurrently, so `on_chunk_*` may be called from
/// several tasks at once and in any order. All methods default to no-ops.
pub trait ReviewProgressCallback: Send + Sync {
    /// Called once, after chunking, before any provider call.
    fn on_review_start(&self, total_chunks: usize) {
        let _ = total_chunks;
    }

    /// Called before the first attempt for a chunk.
    ///
    /// `chunk` is 1-indexed.
    fn on_chunk_start(&self, chunk: usize, total_chunks: usize) {
        let _ = (chunk, total_chunks);
    }

    /// Called when a chunk was reviewed.
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, findings: usize) {
        let _ = (chunk, total_chunks, findings);
    }

    /// Called when a chunk is skipped after its last attempt.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &str) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once after every chunk has settled.
    fn on_review_complete(&self, total_chunks: usize, reviewed: usize) {
        let _ = (total_chunks, reviewed);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ReviewProgressCallback for NoopProgressCallback {}

/// The type stored in [`crate::config::ReviewConfig`].
pub type ProgressCallback = Arc<dyn ReviewProgressCallback>;
