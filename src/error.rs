//! Error types for the pdf2sheet library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`Pdf2SheetError`] - **Fatal**: the run cannot proceed at all (the input
//!   is not a usable PDF, the provider credential is missing, the session
//!   store is unreadable). Returned as `Err(Pdf2SheetError)` from the
//!   top-level `extract*` functions. No partial output is produced.
//!
//! * [`PageError`] - **Non-fatal**: a single page yielded nothing after all
//!   attempts. Stored inside [`crate::output::PageOutcome`]; the page
//!   contributes zero records and the run continues.
//!
//! * [`ServiceError`] - **Per attempt**: one call to the extraction service
//!   failed. Consumed by the retry loop to pick a delay, never surfaced past
//!   the extraction client.

use edgequake_llm::LlmError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use thiserror::Error;

/// A standalone HTTP status number: `429` in "HTTP 429" but not in "4290".
static QUOTA_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b429\b").unwrap());
static GATEWAY_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b50[234]\b").unwrap());

/// All fatal errors returned by the pdf2sheet library.
#[derive(Debug, Error)]
pub enum Pdf2SheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("'{name}' is not a PDF document\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    // ── Document errors ───────────────────────────────────────────────────
    /// The PDF object graph could not be parsed into pages.
    #[error("PDF '{name}' cannot be split into pages: {detail}")]
    DocumentFormat { name: String, detail: String },

    /// The PDF is encrypted; pages cannot be copied out of it.
    #[error("PDF '{name}' is encrypted.\nDecrypt it first, e.g.: qpdf --decrypt input.pdf output.pdf")]
    EncryptedDocument { name: String },

    /// The PDF parsed but contains no pages.
    #[error("PDF '{name}' contains no pages")]
    EmptyDocument { name: String },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    // ── Configuration errors ──────────────────────────────────────────────
    /// No access credential for the selected provider was found.
    #[error(
        "No API key configured for provider '{provider}'.\nSet one of: {}",
        .env_vars.join(", ")
    )]
    MissingCredential {
        provider: String,
        env_vars: Vec<&'static str>,
    },

    /// The provider factory refused to build the provider.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Session / output errors ───────────────────────────────────────────
    /// The session store could not be read or written.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The spreadsheet writer rejected the data.
    #[error("Spreadsheet export failed: {0}")]
    Export(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Run control ───────────────────────────────────────────────────────
    /// The run was cancelled between two pages.
    #[error("Extraction cancelled after {completed_pages} pages")]
    Cancelled { completed_pages: usize },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
///
/// Stored in [`crate::output::PageOutcome`]. The page contributes zero
/// records; every other page is unaffected.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Every attempt against the extraction service failed.
    #[error("Page {page}: extraction failed after {attempts} attempts: {detail}")]
    ExtractionFailed {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The single-page document could not be produced.
    #[error("Page {page}: could not be split out of the document: {detail}")]
    SplitFailed { page: usize, detail: String },
}

/// The outcome of a single failed call to the extraction service.
///
/// Network, quota and parse failures are retried alike; the variant only
/// decides how long the retry loop pauses before the next attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Connection reset, DNS failure, timeout, 5xx.
    #[error("network error: {0}")]
    Network(String),

    /// The provider reported its quota or rate limit as exhausted.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The response was not a JSON array of objects.
    #[error("response is not a JSON record array: {0}")]
    Parse(String),

    /// Anything else the provider returned.
    #[error("service error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Map a provider error onto the retry classes.
    ///
    /// Typed rate-limit and transport variants are trusted as-is; anything
    /// else falls back to [`ServiceError::classify`] on the message.
    pub fn from_llm(err: &LlmError) -> Self {
        match err {
            LlmError::RateLimited(_) => ServiceError::QuotaExceeded(err.to_string()),
            LlmError::NetworkError(_) | LlmError::Timeout => ServiceError::Network(err.to_string()),
            LlmError::TokenLimitExceeded { .. } => ServiceError::Other(err.to_string()),
            _ => ServiceError::classify(err.to_string()),
        }
    }

    /// Classify a provider error message.
    ///
    /// Provider crates report HTTP status and vendor codes in free text, so
    /// the classification is by keyword. Status codes only count as whole
    /// numbers.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if QUOTA_STATUS.is_match(&lower)
            || lower.contains("quota")
            || lower.contains("rate limit")
            || lower.contains("ratelimit")
            || lower.contains("rate_limit")
            || lower.contains("resource_exhausted")
            || lower.contains("resource exhausted")
        {
            ServiceError::QuotaExceeded(message)
        } else if GATEWAY_STATUS.is_match(&lower)
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
        {
            ServiceError::Network(message)
        } else {
            ServiceError::Other(message)
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, ServiceError::QuotaExceeded(_))
    }
}

/// Errors raised by a [`crate::cache::SessionStore`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file '{path}' could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("session file '{path}' is not valid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("session value for '{key}' could not be (de)serialised: {source}")]
    Value {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
