//! Page splitting: cut a single page out of a report as a standalone PDF.
//!
//! The extraction service sees one page at a time, so every call carries a
//! complete, independently parseable one-page document rather than the whole
//! report. Splitting is a pure transformation over the in-memory object
//! graph: clone, delete every other page, drop objects nothing references
//! any more, serialise.
//!
//! Parsing happens once per run in [`PdfSource::parse`]. A report that cannot
//! be parsed is unusable as a whole, so that failure is fatal; a single page
//! that fails to serialise is reported per page by the caller.

use crate::error::Pdf2SheetError;
use crate::pipeline::input::Document;
use std::fmt;
use tracing::{debug, info};

/// A parsed report ready to be split into pages.
pub struct PdfSource {
    name: String,
    inner: lopdf::Document,
    page_count: usize,
}

impl fmt::Debug for PdfSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfSource")
            .field("name", &self.name)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

impl PdfSource {
    /// Parse the document's bytes into a page tree.
    ///
    /// # Errors
    /// * [`Pdf2SheetError::DocumentFormat`] - corrupt or not a PDF
    /// * [`Pdf2SheetError::EncryptedDocument`] - encrypted
    /// * [`Pdf2SheetError::EmptyDocument`] - no pages
    pub fn parse(document: &Document) -> Result<Self, Pdf2SheetError> {
        let name = document.name().to_string();
        let inner = lopdf::Document::load_mem(document.bytes()).map_err(|e| {
            Pdf2SheetError::DocumentFormat {
                name: name.clone(),
                detail: e.to_string(),
            }
        })?;

        if inner.is_encrypted() {
            return Err(Pdf2SheetError::EncryptedDocument { name });
        }

        let page_count = inner.get_pages().len();
        if page_count == 0 {
            return Err(Pdf2SheetError::EmptyDocument { name });
        }

        info!("PDF '{}' loaded: {} pages", name, page_count);
        Ok(Self {
            name,
            inner,
            page_count,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Produce a one-page PDF holding page `index` (0-based).
    pub fn split_page(&self, index: usize) -> Result<Vec<u8>, Pdf2SheetError> {
        if index >= self.page_count {
            return Err(Pdf2SheetError::PageOutOfRange {
                page: index + 1,
                total: self.page_count,
            });
        }

        // lopdf numbers pages from 1.
        let keep = index as u32 + 1;
        let others: Vec<u32> = (1..=self.page_count as u32)
            .filter(|&n| n != keep)
            .collect();

        let mut doc = self.inner.clone();
        doc.delete_pages(&others);
        doc.prune_objects();

        let mut buf = Vec::new();
        doc.save_to(&mut buf)
            .map_err(|e| Pdf2SheetError::DocumentFormat {
                name: self.name.clone(),
                detail: format!("page {} could not be serialised: {}", keep, e),
            })?;

        debug!("Split page {} → {} bytes", keep, buf.len());
        Ok(buf)
    }
}

/// Convenience wrapper: parse `document` and split out page `index` (0-based).
pub fn split(document: &Document, index: usize) -> Result<Vec<u8>, Pdf2SheetError> {
    PdfSource::parse(document)?.split_page(index)
}
