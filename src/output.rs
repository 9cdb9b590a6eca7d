//! Records and run results.
//!
//! A [`Record`] is one row of the source report. Its field set is fixed;
//! values are kept as loosely-typed strings because the extraction service
//! is trusted to emit them in the stated shape and nothing downstream
//! interprets them beyond display and export.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One structured row extracted from the source table.
///
/// Missing keys deserialise as `None`; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    /// Postal tracking code, e.g. `AB123456789BR`.
    pub rastreio: Option<String>,
    /// Process number, e.g. `012345/2024-11`.
    pub processo: Option<String>,
    /// Shipping date, `DD/MM/YYYY`.
    pub data_envio: Option<String>,
    /// Destination sector name.
    pub destino: Option<String>,
    /// Shipping time, `HH:MM:SS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hora_envio: Option<String>,
    /// Document type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documento_tipo: Option<String>,
}

impl Record {
    /// Value of a column, `None` when null.
    pub fn get(&self, field: RecordField) -> Option<&str> {
        match field {
            RecordField::Rastreio => self.rastreio.as_deref(),
            RecordField::Processo => self.processo.as_deref(),
            RecordField::DataEnvio => self.data_envio.as_deref(),
            RecordField::Destino => self.destino.as_deref(),
            RecordField::HoraEnvio => self.hora_envio.as_deref(),
            RecordField::DocumentoTipo => self.documento_tipo.as_deref(),
        }
    }

    pub fn has_extended_fields(&self) -> bool {
        self.hora_envio.is_some() || self.documento_tipo.is_some()
    }
}

/// Columns of a [`Record`], in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordField {
    Rastreio,
    Processo,
    DataEnvio,
    Destino,
    HoraEnvio,
    DocumentoTipo,
}

impl RecordField {
    /// The four columns every report carries.
    pub const BASE: [RecordField; 4] = [
        RecordField::Rastreio,
        RecordField::Processo,
        RecordField::DataEnvio,
        RecordField::Destino,
    ];

    /// Base columns plus time and document type.
    pub const EXTENDED: [RecordField; 6] = [
        RecordField::Rastreio,
        RecordField::Processo,
        RecordField::DataEnvio,
        RecordField::HoraEnvio,
        RecordField::Destino,
        RecordField::DocumentoTipo,
    ];

    /// The JSON key, also used as the spreadsheet header.
    pub fn name(self) -> &'static str {
        match self {
            RecordField::Rastreio => "rastreio",
            RecordField::Processo => "processo",
            RecordField::DataEnvio => "data_envio",
            RecordField::Destino => "destino",
            RecordField::HoraEnvio => "hora_envio",
            RecordField::DocumentoTipo => "documento_tipo",
        }
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened to one page of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Records this page contributed to the aggregate.
    pub record_count: usize,
    /// Calls made to the extraction service for this page.
    pub attempts: u32,
    /// Wall-clock time spent on this page, pacing included.
    pub duration_ms: u64,
    /// Input tokens reported by the provider (0 if unknown).
    pub input_tokens: usize,
    /// Output tokens reported by the provider (0 if unknown).
    pub output_tokens: usize,
    /// Set when the page yielded nothing after all attempts.
    pub error: Option<PageError>,
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages that returned a parseable response.
    pub processed_pages: usize,
    /// Pages that exhausted their attempts.
    pub failed_pages: usize,
    /// Pages not selected by [`crate::config::PageSelection`].
    pub skipped_pages: usize,
    /// Calls made to the extraction service across all pages.
    pub total_calls: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

/// What [`crate::extract::inspect`] reports about a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub page_count: usize,
}

/// The ordered aggregate for one document.
///
/// `records` are in page order, then in the order the service emitted them
/// within a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub records: Vec<Record>,
    /// Pages in the source document.
    pub page_count: usize,
    /// One entry per processed page, in page order.
    pub pages: Vec<PageOutcome>,
    pub stats: ExtractionStats,
    /// The run asked for the extended columns.
    #[serde(default)]
    pub extended_fields: bool,
}

impl ExtractionResult {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pages that contributed nothing because every attempt failed.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageOutcome> {
        self.pages.iter().filter(|p| p.error.is_some())
    }

    /// Columns to export: the extended set when the run asked for it or any
    /// record carries an extended field, the base set otherwise.
    pub fn columns(&self) -> &'static [RecordField] {
        if self.extended_fields || self.records.iter().any(Record::has_extended_fields) {
            &RecordField::EXTENDED
        } else {
            &RecordField::BASE
        }
    }
}
