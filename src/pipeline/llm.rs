//! Extraction client: one page in, records out.
//!
//! This module drives the external extraction service for a single page. It
//! never fails past its boundary. Whatever goes wrong (network, quota,
//! unparseable output) is absorbed here, retried per [`RetryPolicy`], and
//! finally reported as a [`PageError`] next to an empty record list. Nothing
//! propagates to the caller as `Err`.
//!
//! ## Service boundary
//!
//! [`ExtractionService`] is the black box: instruction + one-page PDF in,
//! text out. [`LlmExtractionService`] implements it over any
//! `edgequake_llm` provider. Tests plug in scripted fakes.
//!
//! ## Waits
//!
//! Every call is preceded by [`Pacer::wait_turn`], which keeps consecutive
//! calls `min_call_interval` apart across pages and attempts alike. A failed
//! attempt first pauses for the policy's retry delay (longer on quota
//! errors), then for the full pacing interval.

use crate::config::ExtractionConfig;
use crate::error::{PageError, ServiceError};
use crate::output::Record;
use crate::pipeline::parse::parse_records;
use crate::pipeline::postprocess::clean_records;
use crate::pipeline::retry::{Pacer, RetryPolicy, Sleeper};
use crate::prompts::default_instruction;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// MIME type of the page payload.
pub const PAGE_MIME_TYPE: &str = "application/pdf";

/// `CompletionOptions::response_format` value that switches providers into
/// JSON mode (`responseMimeType: application/json` on Gemini).
pub const JSON_RESPONSE_FORMAT: &str = "json_object";

/// One call to the extraction service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRequest<'a> {
    /// Instruction injected verbatim.
    pub instruction: &'a str,
    /// A complete one-page PDF.
    pub page_pdf: &'a [u8],
    /// 1-indexed page number, for logging.
    pub page_num: usize,
    pub temperature: f32,
    pub max_tokens: usize,
}

/// Raw service output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceResponse {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ServiceResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// The external structured-extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    async fn call(&self, request: &ServiceRequest<'_>) -> Result<ServiceResponse, ServiceError>;
}

/// [`ExtractionService`] over an `edgequake_llm` vision provider.
///
/// ## Message Layout
///
/// 1. **System message** - the extraction instruction, and nothing else.
///    Gemini keeps a single system instruction, so a second one would
///    replace it.
/// 2. **User message** - the one-page PDF as a base64 attachment (empty text)
///
/// JSON output is requested through [`JSON_RESPONSE_FORMAT`], not prose.
pub struct LlmExtractionService {
    provider: Arc<dyn LLMProvider>,
}

impl LlmExtractionService {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ExtractionService for LlmExtractionService {
    async fn call(&self, request: &ServiceRequest<'_>) -> Result<ServiceResponse, ServiceError> {
        let page = ImageData::new(STANDARD.encode(request.page_pdf), PAGE_MIME_TYPE);
        let messages = vec![
            ChatMessage::system(request.instruction),
            ChatMessage::user_with_images("", vec![page]),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            response_format: Some(JSON_RESPONSE_FORMAT.to_string()),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| ServiceError::from_llm(&e))?;

        Ok(ServiceResponse {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// What one page yielded.
#[derive(Debug, Clone, PartialEq)]
pub struct PageExtraction {
    pub page_num: usize,
    /// Records in emission order; empty when `error` is set.
    pub records: Vec<Record>,
    /// Calls made for this page.
    pub attempts: u32,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub error: Option<PageError>,
}

/// Extracts records from single-page PDFs with retry and pacing.
pub struct ExtractionClient {
    service: Arc<dyn ExtractionService>,
    instruction: String,
    temperature: f32,
    max_tokens: usize,
    retry: RetryPolicy,
    pacer: Pacer,
    sleeper: Arc<dyn Sleeper>,
}

impl ExtractionClient {
    pub fn new(service: Arc<dyn ExtractionService>, config: &ExtractionConfig) -> Self {
        let instruction = config
            .instruction
            .clone()
            .unwrap_or_else(|| default_instruction(config.extended_fields).to_string());
        Self {
            service,
            instruction,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry: config.retry.clone(),
            pacer: Pacer::new(config.min_call_interval),
            sleeper: Arc::clone(&config.sleeper),
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Extract the records on one page.
    ///
    /// Always returns a [`PageExtraction`]; a page that failed every attempt
    /// has no records and carries a [`PageError::ExtractionFailed`].
    pub async fn extract(&self, page_pdf: &[u8], page_num: usize) -> PageExtraction {
        let start = Instant::now();
        let request = ServiceRequest {
            instruction: &self.instruction,
            page_pdf,
            page_num,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut input_tokens = 0;
        let mut output_tokens = 0;
        let mut last_err: Option<ServiceError> = None;
        let mut attempts = 0;

        while attempts < self.retry.max_attempts {
            attempts += 1;
            self.pacer.wait_turn(self.sleeper.as_ref()).await;

            let outcome = match self.service.call(&request).await {
                Ok(response) => {
                    input_tokens += response.input_tokens;
                    output_tokens += response.output_tokens;
                    parse_records(&response.text)
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(records) => {
                    let records = clean_records(records);
                    debug!(
                        "Page {}: {} records on attempt {} ({} in / {} out tokens)",
                        page_num,
                        records.len(),
                        attempts,
                        input_tokens,
                        output_tokens
                    );
                    return PageExtraction {
                        page_num,
                        records,
                        attempts,
                        input_tokens,
                        output_tokens,
                        duration_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(
                        "Page {}: attempt {}/{} failed: {}",
                        page_num, attempts, self.retry.max_attempts, e
                    );
                    if let Some(delay) = self.retry.delay_for(attempts, &e) {
                        debug!("Page {}: retrying in {}ms", page_num, delay.as_millis());
                        self.sleeper.sleep(delay).await;
                        self.pacer.restart();
                    }
                    last_err = Some(e);
                }
            }
        }

        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempt was made".to_string());

        PageExtraction {
            page_num,
            records: Vec::new(),
            attempts,
            input_tokens,
            output_tokens,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(PageError::ExtractionFailed {
                page: page_num,
                attempts,
                detail,
            }),
        }
    }
}
