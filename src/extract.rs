//! End-to-end extraction entry points.
//!
//! Pages are processed one at a time, in page order. Each page is split out
//! of the report, sent to the extraction service, and its records appended
//! to the aggregate. A page that fails every attempt contributes nothing and
//! the run moves on; only problems with the document as a whole, or with the
//! configuration, abort the run.

use crate::cache::{ExtractionPipeline, RunParameters};
use crate::config::{credential_env_vars, ExtractionConfig};
use crate::error::{PageError, Pdf2SheetError};
use crate::export;
use crate::output::{DocumentInfo, ExtractionResult, ExtractionStats, PageOutcome};
use crate::pipeline::aggregate::aggregate;
use crate::pipeline::input::{self, Document};
use crate::pipeline::llm::{ExtractionClient, ExtractionService, LlmExtractionService};
use crate::pipeline::split::PdfSource;
use async_trait::async_trait;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract records from a PDF file or URL.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input` - Local file path or HTTP/HTTPS URL to a PDF
/// * `config` - Extraction configuration
///
/// # Returns
/// `Ok(ExtractionResult)` even if some or all pages failed
/// (check `result.stats.failed_pages`).
///
/// # Errors
/// Returns `Err(Pdf2SheetError)` only for fatal errors:
/// - Missing credential (checked before the input is touched)
/// - File not found / download failed / not a PDF
/// - PDF cannot be parsed into pages
/// - Cancelled
pub async fn extract(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2SheetError> {
    let extractor = Extractor::new(config.clone())?;
    let document = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extractor.run_document(&document).await
}

/// Extract records from an already loaded [`Document`].
pub async fn extract_document(
    document: &Document,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2SheetError> {
    Extractor::new(config.clone())?.run_document(document).await
}

/// Extract records from PDF bytes held in memory.
///
/// `name` becomes part of the document identity used by the result cache.
///
/// # Example
/// ```rust,no_run
/// use pdf2sheet::{extract_from_bytes, ExtractionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes: Vec<u8> = std::fs::read("relatorio.pdf")?;
/// let config = ExtractionConfig::default();
/// let result = extract_from_bytes("relatorio.pdf", bytes, &config).await?;
/// println!("{} records", result.record_count());
/// # Ok(())
/// # }
/// ```
pub async fn extract_from_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2SheetError> {
    let name = name.into();
    input::check_magic(&name, &bytes)?;
    extract_document(&Document::new(name, bytes), config).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2SheetError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2SheetError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(input_str, config))
}

/// Extract records and write the spreadsheet to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, Pdf2SheetError> {
    let result = extract(input_str, config).await?;
    export::write_xlsx(&result, output_path.as_ref())?;
    Ok(result)
}

/// Report name, size and page count without calling the service.
///
/// Does not require a credential.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentInfo, Pdf2SheetError> {
    let document = input::resolve_input(input_str.as_ref(), 120).await?;
    let source = PdfSource::parse(&document)?;
    Ok(DocumentInfo {
        name: document.name().to_string(),
        size: document.size(),
        page_count: source.page_count(),
    })
}

/// A configured pipeline: config plus a ready extraction client.
///
/// The client's pacer lives as long as the `Extractor`, so consecutive runs
/// through the same instance share the call-rate ceiling.
pub struct Extractor {
    config: ExtractionConfig,
    client: ExtractionClient,
}

impl Extractor {
    /// Resolve the extraction service from `config` and build the client.
    ///
    /// # Errors
    /// [`Pdf2SheetError::MissingCredential`] or
    /// [`Pdf2SheetError::ProviderNotConfigured`].
    pub fn new(config: ExtractionConfig) -> Result<Self, Pdf2SheetError> {
        let service = resolve_service(&config)?;
        Ok(Self::with_service(service, config))
    }

    /// Use `service` regardless of what `config` names.
    pub fn with_service(service: Arc<dyn ExtractionService>, config: ExtractionConfig) -> Self {
        let client = ExtractionClient::new(service, &config);
        Self { config, client }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run the page-wise pipeline over `document`.
    pub async fn run_document(
        &self,
        document: &Document,
    ) -> Result<ExtractionResult, Pdf2SheetError> {
        let total_start = Instant::now();
        let config = &self.config;
        info!(
            "Starting extraction: {} ({} bytes)",
            document.name(),
            document.size()
        );

        // ── Step 1: Parse the page tree ──────────────────────────────────────
        let source = PdfSource::parse(document)?;
        let total_pages = source.page_count();

        // ── Step 2: Compute page indices ─────────────────────────────────────
        let page_indices = config.pages.to_indices(total_pages);
        if page_indices.is_empty() {
            return Err(Pdf2SheetError::PageOutOfRange {
                page: 0,
                total: total_pages,
            });
        }
        let selected = page_indices.len();
        debug!("Selected {} of {} pages", selected, total_pages);

        if let Some(ref cb) = config.progress_callback {
            cb.on_extraction_start(selected);
        }

        // ── Step 3: Extract page by page ─────────────────────────────────────
        let mut per_page = Vec::with_capacity(selected);
        let mut pages = Vec::with_capacity(selected);

        for (done, idx) in page_indices.iter().copied().enumerate() {
            if config
                .cancellation
                .as_ref()
                .is_some_and(|token| token.is_cancelled())
            {
                warn!("Extraction cancelled after {} of {} pages", done, selected);
                return Err(Pdf2SheetError::Cancelled {
                    completed_pages: done,
                });
            }

            let page_num = idx + 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_num, total_pages);
            }

            let (records, outcome) = match source.split_page(idx) {
                Ok(page_pdf) => {
                    let page = self.client.extract(&page_pdf, page_num).await;
                    let outcome = PageOutcome {
                        page_num,
                        record_count: page.records.len(),
                        attempts: page.attempts,
                        duration_ms: page.duration_ms,
                        input_tokens: page.input_tokens,
                        output_tokens: page.output_tokens,
                        error: page.error,
                    };
                    (page.records, outcome)
                }
                Err(e) => {
                    warn!("Page {}: could not be split: {}", page_num, e);
                    let outcome = PageOutcome {
                        page_num,
                        record_count: 0,
                        attempts: 0,
                        duration_ms: 0,
                        input_tokens: 0,
                        output_tokens: 0,
                        error: Some(PageError::SplitFailed {
                            page: page_num,
                            detail: e.to_string(),
                        }),
                    };
                    (Vec::new(), outcome)
                }
            };

            if let Some(ref cb) = config.progress_callback {
                match &outcome.error {
                    None => cb.on_page_complete(page_num, total_pages, outcome.record_count),
                    Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }

            per_page.push(records);
            pages.push(outcome);
        }

        // ── Step 4: Aggregate ────────────────────────────────────────────────
        let records = aggregate(per_page);

        // ── Step 5: Compute stats ────────────────────────────────────────────
        let processed = pages.iter().filter(|p| p.error.is_none()).count();
        let failed = pages.len() - processed;
        let stats = ExtractionStats {
            total_pages,
            processed_pages: processed,
            failed_pages: failed,
            skipped_pages: total_pages - selected,
            total_calls: pages.iter().map(|p| p.attempts).sum(),
            total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
            total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };

        info!(
            "Extraction complete: {} records from {}/{} pages ({} failed), {}ms",
            records.len(),
            processed,
            selected,
            failed,
            stats.total_duration_ms
        );

        if let Some(ref cb) = config.progress_callback {
            cb.on_extraction_complete(selected, records.len());
        }

        Ok(ExtractionResult {
            records,
            page_count: total_pages,
            pages,
            stats,
            extended_fields: config.extended_fields,
        })
    }
}

#[async_trait]
impl ExtractionPipeline for Extractor {
    async fn run(&self, document: &Document) -> Result<ExtractionResult, Pdf2SheetError> {
        self.run_document(document).await
    }

    fn parameters(&self) -> RunParameters {
        RunParameters {
            pages: self.config.pages.clone(),
            extended_fields: self.config.extended_fields,
            instruction: self.client.instruction().to_string(),
        }
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Resolve the extraction service, from most-specific to least-specific.
///
/// 1. **Pre-built service** (`config.service`) - used as-is, no credential
///    check. This is how tests and embedding callers inject their own.
/// 2. **Named provider** (`config.provider_name`) - the credential must be
///    present in the environment before anything else happens; then
///    [`ProviderFactory::create_llm_provider`] builds the provider.
pub fn resolve_service(
    config: &ExtractionConfig,
) -> Result<Arc<dyn ExtractionService>, Pdf2SheetError> {
    if let Some(ref service) = config.service {
        return Ok(Arc::clone(service));
    }

    let provider_name = config.provider_name.as_str();
    check_credential(provider_name)?;

    let model = config
        .resolved_model()
        .ok_or_else(|| Pdf2SheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: "No default model for this provider; pass one with --model.".to_string(),
        })?;

    let provider = create_vision_provider(provider_name, model)?;
    info!("Using provider '{}' with model '{}'", provider_name, model);
    Ok(Arc::new(LlmExtractionService::new(provider)))
}

/// Refuse to run when the provider needs a key and none is set.
fn check_credential(provider_name: &str) -> Result<(), Pdf2SheetError> {
    let vars = credential_env_vars(provider_name);
    if vars.is_empty() {
        return Ok(());
    }
    let present = vars.iter().any(|var| {
        std::env::var(var)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    });
    if present {
        Ok(())
    } else {
        Err(Pdf2SheetError::MissingCredential {
            provider: provider_name.to_string(),
            env_vars: vars.to_vec(),
        })
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Pdf2SheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2SheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_providers_need_no_credential() {
        assert!(check_credential("ollama").is_ok());
        assert!(check_credential("lmstudio").is_ok());
    }

    #[test]
    fn unknown_provider_without_model_is_not_configured() {
        let config = ExtractionConfig::builder()
            .provider_name("lmstudio")
            .build()
            .unwrap();
        let err = resolve_service(&config).err().unwrap();
        assert!(
            matches!(err, Pdf2SheetError::ProviderNotConfigured { .. }),
            "got {err:?}"
        );
    }
}
