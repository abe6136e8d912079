//! Schema document loading.
//!
//! Loads schema documents from files, strings, and HTTP URLs, registering
//! them in the process-wide [`SchemaRegistry`], and provides the stock
//! [`SchemaFileResolver`] implementations used to satisfy cross-file `$ref`s.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use serde_json::Value;

use crate::error::ResolveError;
use crate::object::{SchemaDocument, SchemaRegistry};
use crate::resolver::{FileResolution, SchemaFileResolver};

#[cfg(feature = "remote")]
use std::time::Duration;

/// Default timeout for HTTP requests (10 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Load a schema document from a file path, through the global registry.
///
/// The file's modification time is the cache stamp: editing the file and
/// loading again yields a fresh document.
///
/// # Errors
///
/// Returns `ResolveError::FileNotFound` if the file doesn't exist,
/// or `ResolveError::InvalidJson` if the file isn't valid JSON.
pub fn load_document(path: &Path) -> Result<Arc<SchemaDocument>, ResolveError> {
    let url = path.to_string_lossy().to_string();
    let stamp = modification_stamp(path);
    SchemaRegistry::global().get_or_insert_with(&url, stamp, || read_schema_value(path))
}

fn read_schema_value(path: &Path) -> Result<Value, ResolveError> {
    if !path.exists() {
        return Err(ResolveError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path).map_err(|source| ResolveError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ResolveError::InvalidJson { source })
}

fn modification_stamp(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}

/// Parse a schema document from a JSON string, without registering it.
///
/// # Errors
///
/// Returns `ResolveError::InvalidJson` if the string isn't valid JSON.
pub fn load_document_str(content: &str, url: &str) -> Result<Arc<SchemaDocument>, ResolveError> {
    let value =
        serde_json::from_str(content).map_err(|source| ResolveError::InvalidJson { source })?;
    Ok(SchemaDocument::new(url, 0, value))
}

/// Load a schema document from an HTTP/HTTPS URL, through the registry.
///
/// Requires the `remote` feature (enabled by default).
///
/// # Errors
///
/// Returns `ResolveError::NetworkError` if the request fails,
/// or `ResolveError::InvalidJson` if the response isn't valid JSON.
#[cfg(feature = "remote")]
pub fn load_document_url(url: &str) -> Result<Arc<SchemaDocument>, ResolveError> {
    if let Some(document) = SchemaRegistry::global().get(url, 0) {
        return Ok(document);
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|source| ResolveError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let response = client
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|source| ResolveError::NetworkError {
            url: url.to_string(),
            source,
        })?;

    let value: Value = response.json().map_err(|source| ResolveError::NetworkError {
        url: url.to_string(),
        source,
    })?;

    let document = SchemaDocument::new(url, 0, value);
    SchemaRegistry::global().insert(Arc::clone(&document));
    Ok(document)
}

/// Check if a string looks like a URL (starts with http:// or https://).
pub fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Load a schema document from a file path or URL.
///
/// Automatically detects whether the source is a URL or file path.
/// URL loading requires the `remote` feature.
pub fn load_document_auto(source: &str) -> Result<Arc<SchemaDocument>, ResolveError> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            load_document_url(source)
        }
        #[cfg(not(feature = "remote"))]
        {
            Err(ResolveError::FileNotFound {
                path: PathBuf::from(source),
            })
        }
    } else {
        load_document(Path::new(source))
    }
}

/// Resolves `$ref` schema ids against the referring file's directory, then a
/// base directory; URL ids are fetched when the `remote` feature is on.
pub struct DirectoryResolver {
    base_dir: PathBuf,
}

impl DirectoryResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        DirectoryResolver {
            base_dir: base_dir.into(),
        }
    }
}

impl SchemaFileResolver for DirectoryResolver {
    fn resolve(&self, schema_id: &str, referrer: &SchemaDocument) -> FileResolution {
        if is_url(schema_id) {
            #[cfg(feature = "remote")]
            {
                return match load_document_url(schema_id) {
                    Ok(document) => FileResolution::Found(document),
                    Err(_) => FileResolution::NotFound,
                };
            }
            #[cfg(not(feature = "remote"))]
            {
                return FileResolution::NotFound;
            }
        }

        let referrer_dir = Path::new(referrer.url()).parent().map(Path::to_path_buf);
        let candidates = referrer_dir
            .map(|dir| dir.join(schema_id))
            .into_iter()
            .chain(std::iter::once(self.base_dir.join(schema_id)));
        for candidate in candidates {
            if candidate.exists() {
                return match load_document(&candidate) {
                    Ok(document) => FileResolution::Found(document),
                    Err(_) => FileResolution::NotFound,
                };
            }
        }
        FileResolution::NotFound
    }
}

/// In-process resolver mapping schema ids to preloaded documents. Ids marked
/// pending simulate a fetch that has not completed yet.
#[derive(Default)]
pub struct StaticResolver {
    documents: HashMap<String, Arc<SchemaDocument>>,
    pending: HashSet<String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        StaticResolver::default()
    }

    pub fn insert(&mut self, schema_id: impl Into<String>, document: Arc<SchemaDocument>) {
        self.documents.insert(schema_id.into(), document);
    }

    pub fn mark_pending(&mut self, schema_id: impl Into<String>) {
        self.pending.insert(schema_id.into());
    }
}

impl SchemaFileResolver for StaticResolver {
    fn resolve(&self, schema_id: &str, _referrer: &SchemaDocument) -> FileResolution {
        if self.pending.contains(schema_id) {
            return FileResolution::Pending;
        }
        match self.documents.get(schema_id) {
            Some(document) => FileResolution::Found(Arc::clone(document)),
            None => FileResolution::NotFound,
        }
    }
}
