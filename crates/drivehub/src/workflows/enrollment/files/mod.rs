//! External file storage consumed by document uploads.
//!
//! The workflow only ever sees an opaque [`FileRef`]; where the bytes live (local disk or
//! memory) is decided by whichever [`FileStore`] the service is built with.

mod local;

pub use local::LocalFileStore;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle returned by a file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File content handed over by the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: mime::Mime,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: mime::Mime, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Storage for uploaded bytes. Lives outside the workflow's transactional boundary.
pub trait FileStore: Send + Sync {
    /// Persist the upload under `folder`, returning the reference to record on the document.
    fn store(&self, folder: &str, upload: &FileUpload) -> Result<FileRef, FileStoreError>;
    /// Resolve a reference into a URL the client can fetch.
    fn url(&self, file_ref: &FileRef) -> Result<String, FileStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("file store io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown file reference '{0}'")]
    UnknownReference(String),
}

/// Keep only characters that are safe inside a single path segment.
pub(crate) fn sanitize_file_name(raw: &str) -> String {
    let cleaned: String = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_') {
                ch
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}
