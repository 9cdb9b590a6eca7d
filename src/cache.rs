//! Result cache keyed by document identity.
//!
//! Extraction is slow and rate-limited, so the aggregate for a document is
//! kept in a session store and served again for as long as the same document
//! (same name, same size) is presented with the same [`RunParameters`]. A
//! different document, or the same one with another page selection, field
//! set or instruction, discards the stored result before its own run starts.
//!
//! The cache holds a single slot made of four keys:
//!
//! | Key                     | Value                                  |
//! |-------------------------|----------------------------------------|
//! | `document_identity`     | [`DocumentIdentity`] of the run        |
//! | `run_parameters`        | [`RunParameters`] of the run           |
//! | `extraction_result`     | [`ExtractionResult`]                   |
//! | `extraction_complete`   | `true` once the run finished           |
//!
//! The completion flag is written last. An entry without it (a run that
//! crashed or was cancelled halfway) is a miss.

use crate::config::PageSelection;
use crate::error::{Pdf2SheetError, SessionError};
use crate::output::ExtractionResult;
use crate::pipeline::input::{Document, DocumentIdentity};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const KEY_IDENTITY: &str = "document_identity";
const KEY_PARAMETERS: &str = "run_parameters";
const KEY_RESULT: &str = "extraction_result";
const KEY_COMPLETE: &str = "extraction_complete";

/// Opaque key-value storage that outlives a single run.
pub trait SessionStore: Send {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError>;
    fn clear(&mut self) -> Result<(), SessionError>;
}

/// A store that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.entries.clear();
        Ok(())
    }
}

/// A store backed by one JSON file.
///
/// Every write replaces the file atomically (temp file in the same
/// directory, then rename), so a reader never sees a half-written session.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl FileStore {
    /// Open the session file at `path`, or start empty if it doesn't exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| SessionError::Corrupt {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(SessionError::Io { path, source: e }),
        };
        debug!("Session file {} opened ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), SessionError> {
        let io_err = |source| SessionError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(io_err)?;

        let bytes = serde_json::to_vec_pretty(&self.entries).map_err(|e| SessionError::Value {
            key: "*".into(),
            source: e,
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        self.entries.insert(key.to_string(), value);
        self.persist()
    }

    fn clear(&mut self) -> Result<(), SessionError> {
        self.entries.clear();
        self.persist()
    }
}

/// Settings that change what a run returns for the same document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParameters {
    pub pages: PageSelection,
    pub extended_fields: bool,
    /// The instruction actually sent, built-in or custom.
    pub instruction: String,
}

/// The cache's view of the extraction pipeline.
#[async_trait]
pub trait ExtractionPipeline: Send + Sync {
    /// Run extraction end to end on `document`.
    async fn run(&self, document: &Document) -> Result<ExtractionResult, Pdf2SheetError>;

    /// What this pipeline would be asked to extract. A stored result is only
    /// served to a pipeline with equal parameters.
    fn parameters(&self) -> RunParameters;
}

/// The `(name, size)` cache key of `document`.
pub fn identity_of(document: &Document) -> DocumentIdentity {
    document.identity()
}

/// Single-slot cache of the last document's extraction result.
#[derive(Debug)]
pub struct ResultCache<S> {
    store: S,
}

impl<S: SessionStore> ResultCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Identity of the stored entry, complete or not.
    pub fn identity(&self) -> Result<Option<DocumentIdentity>, SessionError> {
        self.read(KEY_IDENTITY)
    }

    /// Parameters of the stored entry, complete or not.
    pub fn parameters(&self) -> Result<Option<RunParameters>, SessionError> {
        self.read(KEY_PARAMETERS)
    }

    /// The stored result, if its run completed.
    pub fn cached(&self) -> Result<Option<ExtractionResult>, SessionError> {
        let complete: Option<bool> = self.read(KEY_COMPLETE)?;
        if complete != Some(true) {
            return Ok(None);
        }
        self.read(KEY_RESULT)
    }

    /// Drop whatever is stored.
    pub fn invalidate(&mut self) -> Result<(), SessionError> {
        self.store.clear()
    }

    /// Serve the stored result for `document`, or run `pipeline` and store
    /// what it returns.
    ///
    /// A stored result is a hit only when both the document identity and
    /// [`ExtractionPipeline::parameters`] match the stored ones.
    ///
    /// # Errors
    /// Whatever the pipeline returns, after which the store is empty, or a
    /// [`Pdf2SheetError::Session`] when the store itself fails.
    pub async fn get_or_extract(
        &mut self,
        document: &Document,
        pipeline: &dyn ExtractionPipeline,
    ) -> Result<ExtractionResult, Pdf2SheetError> {
        let identity = identity_of(document);
        let parameters = pipeline.parameters();

        if self.identity()?.as_ref() == Some(&identity) {
            if self.parameters()?.as_ref() != Some(&parameters) {
                debug!(
                    "Stored entry for {} was made with other run parameters; extracting again",
                    identity
                );
            } else if let Some(result) = self.cached()? {
                info!(
                    "Serving cached result for {} ({} records)",
                    identity,
                    result.record_count()
                );
                return Ok(result);
            } else {
                debug!("Stored entry for {} is incomplete; extracting again", identity);
            }
        }

        self.store.clear()?;
        self.write(KEY_IDENTITY, &identity)?;
        self.write(KEY_PARAMETERS, &parameters)?;

        let result = match pipeline.run(document).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(clear_err) = self.store.clear() {
                    warn!("Could not clear session after failed run: {}", clear_err);
                }
                return Err(e);
            }
        };

        self.write(KEY_RESULT, &result)?;
        self.write(KEY_COMPLETE, &true)?;
        info!("Cached {} records for {}", result.record_count(), identity);
        Ok(result)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        match self.store.get(key)? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| SessionError::Value {
                    key: key.to_string(),
                    source: e,
                }),
        }
    }

    fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value).map_err(|e| SessionError::Value {
            key: key.to_string(),
            source: e,
        })?;
        self.store.set(key, value)
    }
}
