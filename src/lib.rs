//! # pdf2sheet
//!
//! Extract shipping and protocol records from PDF reports with a multimodal
//! model, and export them as a spreadsheet.
//!
//! ## Why this crate?
//!
//! Dispatch reports list tracking codes, process numbers, dates and
//! destinations in tables whose layout drifts from page to page: columns
//! wrap, cells are left blank, headers repeat. A text extractor loses the
//! column boundaries. Instead each page is sent on its own to a vision model
//! with a fixed instruction and a fixed output schema, and the per-page
//! answers are stitched back together in page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Split      one standalone PDF per page (lopdf)
//!  ├─ 3. Extract    one paced, retried service call per page
//!  ├─ 4. Clean      parse JSON, fix field form
//!  ├─ 5. Aggregate  concatenate in page order
//!  ├─ 6. Cache      keyed by (name, size) in a session store
//!  └─ 7. Export     metrics, preview, .xlsx
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2sheet::{extract, export, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY (or GOOGLE_API_KEY) from the environment
//!     let config = ExtractionConfig::default();
//!     let result = extract("relatorio.pdf", &config).await?;
//!     println!("{} records from {} pages", result.record_count(), result.page_count);
//!     export::write_xlsx(&result, std::path::Path::new("Relatorio_Processado.xlsx"))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2sheet` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf2sheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{
    identity_of, ExtractionPipeline, FileStore, MemoryStore, ResultCache, RunParameters, SessionStore,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use error::{PageError, Pdf2SheetError, ServiceError, SessionError};
pub use export::{render, Metrics, Rendered};
pub use extract::{
    extract, extract_document, extract_from_bytes, extract_sync, extract_to_file, inspect,
    Extractor,
};
pub use output::{DocumentInfo, ExtractionResult, ExtractionStats, PageOutcome, Record, RecordField};
pub use pipeline::input::{Document, DocumentIdentity};
pub use pipeline::llm::{ExtractionService, LlmExtractionService, ServiceRequest, ServiceResponse};
pub use pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use progress::{CancellationToken, ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
