//! Pipeline stages for PDF-to-spreadsheet extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ llm ──▶ parse ──▶ postprocess ──▶ aggregate
//! (path/URL) (lopdf)  (service) (JSON)   (cleanup)      (concat)
//! ```
//!
//! 1. [`input`]  - read the local file or download the URL, check the magic
//! 2. [`split`]  - cut each selected page into a standalone one-page PDF
//! 3. [`llm`]    - call the extraction service with retry and pacing; the
//!    only stage with network I/O
//! 4. [`parse`]  - turn the response text into records, or fail the attempt
//! 5. [`postprocess`] - deterministic fixes to field form
//! 6. [`aggregate`] - concatenate page results in page order
//!
//! [`retry`] holds the retry policy, the pacer and the sleep abstraction
//! shared by stage 3.

pub mod aggregate;
pub mod input;
pub mod llm;
pub mod parse;
pub mod postprocess;
pub mod retry;
pub mod split;
