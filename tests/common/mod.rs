//! Shared fixtures for the integration tests.
//!
//! Nothing here touches the network: PDFs are built in memory with lopdf,
//! the extraction service is a script, and sleeps are recorded instead of
//! taken.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::BoxFuture;
use lopdf::{dictionary, Object, Stream};
use pdf2sheet::{
    ExtractionConfig, ExtractionConfigBuilder, ExtractionService, ServiceError, ServiceRequest,
    ServiceResponse, Sleeper,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── PDFs ─────────────────────────────────────────────────────────────────────

/// An N-page PDF whose page k draws the text `Page k`.
pub fn sample_pdf(pages: usize) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for n in 1..=pages {
        let content = format!("BT /F1 18 Tf 72 720 Td (Page {n}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).expect("save sample pdf");
    buf
}

/// Text drawn on the only page of a one-page PDF.
pub fn single_page_text(bytes: &[u8]) -> String {
    let doc = lopdf::Document::load_mem(bytes).expect("page payload must parse");
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1, "page payload must hold exactly one page");
    let page_id = *pages.values().next().expect("one page");
    String::from_utf8_lossy(&doc.get_page_content(page_id).expect("page content")).into_owned()
}

// ── Records ──────────────────────────────────────────────────────────────────

/// A JSON array response holding one record per destination tag.
pub fn records_json(tags: &[&str]) -> String {
    let items: Vec<serde_json::Value> = tags
        .iter()
        .enumerate()
        .map(|(i, tag)| {
            serde_json::json!({
                "rastreio": format!("AB{:09}BR", i + 1),
                "processo": null,
                "data_envio": "05/03/2024",
                "destino": tag,
            })
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

pub fn ok(text: impl Into<String>) -> Result<ServiceResponse, ServiceError> {
    Ok(ServiceResponse {
        text: text.into(),
        input_tokens: 100,
        output_tokens: 20,
    })
}

// ── Fake extraction service ──────────────────────────────────────────────────

/// One call as the service saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub page_num: usize,
    pub page_text: String,
    pub instruction: String,
}

/// Replays a per-page script of outcomes. A page with no script left
/// answers `[]`.
#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<HashMap<usize, VecDeque<Result<ServiceResponse, ServiceError>>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `outcomes` for `page_num`, one per attempt.
    pub fn on_page(
        self: &Arc<Self>,
        page_num: usize,
        outcomes: Vec<Result<ServiceResponse, ServiceError>>,
    ) -> Arc<Self> {
        self.script
            .lock()
            .unwrap()
            .entry(page_num)
            .or_default()
            .extend(outcomes);
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn pages_called(&self) -> Vec<usize> {
        self.calls.lock().unwrap().iter().map(|c| c.page_num).collect()
    }
}

#[async_trait]
impl ExtractionService for ScriptedService {
    async fn call(&self, request: &ServiceRequest<'_>) -> Result<ServiceResponse, ServiceError> {
        self.calls.lock().unwrap().push(Call {
            page_num: request.page_num,
            page_text: single_page_text(request.page_pdf),
            instruction: request.instruction.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .get_mut(&request.page_num)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| ok("[]"))
    }
}

// ── Sleeper ──────────────────────────────────────────────────────────────────

/// Records requested waits and returns at once.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        self.waits.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

// ── Config ───────────────────────────────────────────────────────────────────

/// A builder wired to `service` with recorded sleeps.
pub fn builder(
    service: Arc<ScriptedService>,
    sleeper: Arc<RecordingSleeper>,
) -> ExtractionConfigBuilder {
    ExtractionConfig::builder().service(service).sleeper(sleeper)
}

pub fn config(service: Arc<ScriptedService>) -> ExtractionConfig {
    builder(service, RecordingSleeper::new())
        .build()
        .expect("valid test config")
}
