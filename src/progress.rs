//! Progress callbacks and cancellation for extraction runs.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! an event before and after each page. Pages are processed one at a time,
//! so events arrive in page order and never concurrently.
//!
//! A [`CancellationToken`] stops a run at the next page boundary.
//!
//! # Example
//!
//! ```rust
//! use pdf2sheet::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ExtractionProgressCallback for Printer {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, record_count: usize) {
//!         eprintln!("page {page_num}/{total_pages}: {record_count} records");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called by the extraction driver as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page count is known, before the first service call.
    ///
    /// # Arguments
    /// * `total_pages` - number of pages that will be processed
    ///
    /// The per-page methods below receive the 1-indexed page number and the
    /// page count of the whole document, so with a page selection the
    /// number of page calls can be smaller than their `total_pages`.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the first attempt for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page returned a parseable response.
    ///
    /// # Arguments
    /// * `page_num`     - 1-indexed page number
    /// * `total_pages`  - pages in the document
    /// * `record_count` - records the page contributed (may be 0)
    fn on_page_complete(&self, page_num: usize, total_pages: usize, record_count: usize) {
        let _ = (page_num, total_pages, record_count);
    }

    /// Called when a page exhausted its attempts and contributes nothing.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    ///
    /// # Arguments
    /// * `total_pages`  - pages selected for this run
    /// * `record_count` - records in the aggregate
    fn on_extraction_complete(&self, total_pages: usize, record_count: usize) {
        let _ = (total_pages, record_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Shared flag checked between pages.
///
/// Cloning shares the flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
