use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::debug;

use super::{sanitize_file_name, FileRef, FileStore, FileStoreError, FileUpload};

/// Writes uploads below a root directory and serves them from a public URL prefix.
#[derive(Debug)]
pub struct LocalFileStore {
    root: PathBuf,
    public_base: String,
    sequence: AtomicU64,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        let mut public_base = public_base.into();
        if !public_base.ends_with('/') {
            public_base.push('/');
        }

        Self {
            root: root.into(),
            public_base,
            sequence: AtomicU64::new(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, file_ref: &FileRef) -> Result<PathBuf, FileStoreError> {
        let relative = Path::new(&file_ref.0);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if escapes {
            return Err(FileStoreError::UnknownReference(file_ref.0.clone()));
        }
        Ok(self.root.join(relative))
    }
}

impl FileStore for LocalFileStore {
    fn store(&self, folder: &str, upload: &FileUpload) -> Result<FileRef, FileStoreError> {
        let folder = folder
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(sanitize_file_name)
            .collect::<Vec<_>>()
            .join("/");
        let directory = self.root.join(&folder);
        fs::create_dir_all(&directory)?;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let unique_name = format!(
            "{}{sequence:04}_{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(&upload.file_name)
        );
        fs::write(directory.join(&unique_name), &upload.bytes)?;

        let file_ref = if folder.is_empty() {
            unique_name
        } else {
            format!("{folder}/{unique_name}")
        };
        debug!(%file_ref, size = upload.bytes.len(), "stored upload on local disk");
        Ok(FileRef(file_ref))
    }

    fn url(&self, file_ref: &FileRef) -> Result<String, FileStoreError> {
        let path = self.resolve(file_ref)?;
        if !path.is_file() {
            return Err(FileStoreError::UnknownReference(file_ref.0.clone()));
        }
        Ok(format!("{}{}", self.public_base, file_ref.0))
    }
}
