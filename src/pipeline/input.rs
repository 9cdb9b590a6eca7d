//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! The whole report is read into memory. Page splitting works on the byte
//! buffer directly, and the document's identity (file name plus byte length)
//! is what the result cache keys on. We validate the PDF magic bytes
//! (`%PDF`) before returning so callers get a meaningful error rather than a
//! parser failure deep in the splitter.

use crate::error::Pdf2SheetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// An uploaded report: opaque bytes plus the name it arrived under.
#[derive(Clone, PartialEq, Eq)]
pub struct Document {
    name: String,
    bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// The `(name, size)` pair the result cache keys on.
    ///
    /// Content is not hashed: two different files with the same name and
    /// length share an identity.
    pub fn identity(&self) -> DocumentIdentity {
        DocumentIdentity {
            name: self.name.clone(),
            size: self.size(),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Cache key of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub name: String,
    pub size: u64,
}

impl fmt::Display for DocumentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.name, self.size)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an in-memory document.
///
/// If the input is a URL, download it. If the input is a local file, read it.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Document, Pdf2SheetError> {
    if input.trim().is_empty() {
        return Err(Pdf2SheetError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Reject buffers that do not start with `%PDF`.
pub fn check_magic(name: &str, bytes: &[u8]) -> Result<(), Pdf2SheetError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(Pdf2SheetError::NotAPdf {
            name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

/// Read a local file, validating existence and PDF magic bytes.
async fn read_local(path: &Path) -> Result<Document, Pdf2SheetError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2SheetError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(Pdf2SheetError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let name = file_name(path);
    check_magic(&name, &bytes)?;

    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(Document::new(name, bytes))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, Pdf2SheetError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2SheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2SheetError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2SheetError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Pdf2SheetError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Pdf2SheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    check_magic(&name, &bytes)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(Document::new(name, bytes))
}

/// Extract a reasonable file name from the URL path.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn identity_is_name_and_size() {
        let doc = Document::new("relatorio.pdf", b"%PDF-1.5 abc".to_vec());
        let id = doc.identity();
        assert_eq!(id.name, "relatorio.pdf");
        assert_eq!(id.size, 12);
        assert_eq!(id.to_string(), "relatorio.pdf (12 bytes)");
    }

    #[test]
    fn same_name_and_size_share_identity() {
        let a = Document::new("r.pdf", b"%PDF-aaaa".to_vec());
        let b = Document::new("r.pdf", b"%PDF-bbbb".to_vec());
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn magic_check() {
        assert!(check_magic("ok.pdf", b"%PDF-1.7").is_ok());
        let err = check_magic("x.pdf", b"PK\x03\x04rest").unwrap_err();
        match err {
            Pdf2SheetError::NotAPdf { magic, .. } => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(
            filename_from_url("https://example.com/reports/protocolo.pdf?x=1"),
            "protocolo.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2SheetError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_file_is_read_with_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protocolo.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%%EOF\n").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(doc.name(), "protocolo.pdf");
        assert_eq!(doc.size(), 15);
    }
}
