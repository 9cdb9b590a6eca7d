//! Configuration types for record extraction.
//!
//! All run behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The defaults encode the extraction
//! service's contract: deterministic decoding, three attempts per page, and
//! at most fifteen calls per minute.

use crate::error::Pdf2SheetError;
use crate::pipeline::llm::ExtractionService;
use crate::pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::progress::{CancellationToken, ProgressCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Provider used when none is named.
pub const DEFAULT_PROVIDER: &str = "gemini";

/// Model used with [`DEFAULT_PROVIDER`] when none is named.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Conventional file name of the exported spreadsheet.
pub const DEFAULT_OUTPUT_FILE: &str = "Relatorio_Processado.xlsx";

/// Configuration for one extraction run.
///
/// Built via [`ExtractionConfig::builder()`] or using
/// [`ExtractionConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2sheet::ExtractionConfig;
/// use std::time::Duration;
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-2.5-flash")
///     .max_attempts(3)
///     .min_call_interval(Duration::from_secs(4))
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM provider name (e.g. "gemini", "openai", "anthropic"). Default: "gemini".
    pub provider_name: String,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] for Gemini and
    /// the provider's own default otherwise.
    pub model: Option<String>,

    /// Pre-constructed extraction service. Takes precedence over
    /// `provider_name` and skips the credential check.
    pub service: Option<Arc<dyn ExtractionService>>,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Extraction must be reproducible: the same page should yield the same
    /// rows on every run.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 8192.
    ///
    /// A dense page of a report lists forty or more rows; a low limit
    /// truncates the JSON array and every attempt then fails to parse.
    pub max_tokens: usize,

    /// Attempts per page and the pauses between them.
    pub retry: RetryPolicy,

    /// Minimum spacing between two consecutive service calls. Default: 4 s.
    ///
    /// Applied after every call, successful or not, so that the run stays
    /// under a ceiling of 15 calls per 60 seconds.
    pub min_call_interval: Duration,

    /// Custom extraction instruction. If None, uses the built-in one.
    pub instruction: Option<String>,

    /// Ask for `hora_envio` and `documento_tipo` as well. Default: false.
    pub extended_fields: bool,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked between pages; when set the run stops.
    pub cancellation: Option<CancellationToken>,

    /// How the pipeline waits. Default: [`TokioSleeper`].
    pub sleeper: Arc<dyn Sleeper>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            provider_name: DEFAULT_PROVIDER.to_string(),
            model: None,
            service: None,
            temperature: 0.0,
            max_tokens: 8192,
            retry: RetryPolicy::default(),
            min_call_interval: Duration::from_secs(4),
            instruction: None,
            extended_fields: false,
            pages: PageSelection::default(),
            download_timeout_secs: 120,
            progress_callback: None,
            cancellation: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("service", &self.service.as_ref().map(|_| "<dyn ExtractionService>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("retry", &self.retry)
            .field("min_call_interval", &self.min_call_interval)
            .field("extended_fields", &self.extended_fields)
            .field("pages", &self.pages)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to the provider's default.
    pub fn resolved_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .or_else(|| default_model_for(&self.provider_name))
    }
}

/// Vision-capable model used for `provider` when none is named.
pub fn default_model_for(provider: &str) -> Option<&'static str> {
    match provider {
        "gemini" => Some(DEFAULT_MODEL),
        "openai" => Some("gpt-4.1-mini"),
        "anthropic" => Some("claude-sonnet-4-20250514"),
        "mistral" => Some("pixtral-large-latest"),
        _ => None,
    }
}

/// Environment variables that can hold the access credential for
/// `provider`. Empty for local providers and for providers we don't know.
pub fn credential_env_vars(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        "anthropic" => &["ANTHROPIC_API_KEY"],
        "mistral" => &["MISTRAL_API_KEY"],
        _ => &[],
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn service(mut self, service: Arc<dyn ExtractionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry.retry_delay = delay;
        self
    }

    pub fn quota_delay(mut self, delay: Duration) -> Self {
        self.config.retry.quota_delay = delay;
        self
    }

    pub fn min_call_interval(mut self, interval: Duration) -> Self {
        self.config.min_call_interval = interval;
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn extended_fields(mut self, v: bool) -> Self {
        self.config.extended_fields = v;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.config.cancellation = Some(token);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.config.sleeper = sleeper;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Pdf2SheetError> {
        let c = &self.config;
        if c.retry.max_attempts == 0 {
            return Err(Pdf2SheetError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(Pdf2SheetError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.provider_name.trim().is_empty() && c.service.is_none() {
            return Err(Pdf2SheetError::InvalidConfig(
                "a provider name or a pre-built service is required".into(),
            ));
        }
        if let Some(ref instruction) = c.instruction {
            if instruction.trim().is_empty() {
                return Err(Pdf2SheetError::InvalidConfig(
                    "custom instruction is empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Extract all pages (default).
    #[default]
    All,
    /// Extract a single page (1-indexed).
    Single(usize),
    /// Extract a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Extract specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let c = ExtractionConfig::default();
        assert_eq!(c.temperature, 0.0);
        assert_eq!(c.retry.max_attempts, 3);
        assert_eq!(c.retry.retry_delay, Duration::from_secs(1));
        assert_eq!(c.retry.quota_delay, Duration::from_secs(5));
        assert_eq!(c.min_call_interval, Duration::from_secs(4));
        assert_eq!(c.resolved_model(), Some(DEFAULT_MODEL));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ExtractionConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, Pdf2SheetError::InvalidConfig(_)));
    }

    #[test]
    fn blank_instruction_rejected() {
        let err = ExtractionConfig::builder()
            .instruction("   ")
            .build()
            .unwrap_err();
        assert!(matches!(err, Pdf2SheetError::InvalidConfig(_)));
    }

    #[test]
    fn model_falls_back_per_provider() {
        let c = ExtractionConfig::builder()
            .provider_name("openai")
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), Some("gpt-4.1-mini"));

        let c = ExtractionConfig::builder()
            .provider_name("ollama")
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), None);

        let c = ExtractionConfig::builder()
            .provider_name("ollama")
            .model("llava")
            .build()
            .unwrap();
        assert_eq!(c.resolved_model(), Some("llava"));
    }

    #[test]
    fn credential_lookup_table() {
        assert_eq!(
            credential_env_vars("gemini"),
            &["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        );
        assert!(credential_env_vars("ollama").is_empty());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        assert_eq!(PageSelection::Single(2).to_indices(3), vec![1]);
        assert_eq!(PageSelection::Single(4).to_indices(3), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 9).to_indices(3), vec![1, 2]);
        assert_eq!(
            PageSelection::Set(vec![3, 1, 3]).to_indices(5),
            vec![0, 2]
        );
    }
}
