//! Backing storage for template sources.
//!
//! Storage only answers three questions about a resolved path: does it
//! exist, when was it last modified, and what does it contain.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{TemplateError, TemplateResult};

/// Source of template text keyed by resolved path.
#[cfg_attr(test, mockall::automock)]
pub trait TemplateStorage: Send + Sync {
    /// Whether a template file is present at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Last modification time of the template at `path`.
    fn modified(&self, path: &Path) -> TemplateResult<DateTime<Utc>>;

    /// Read the template text at `path`.
    fn read(&self, path: &Path) -> TemplateResult<String>;
}

impl<T: TemplateStorage + ?Sized> TemplateStorage for Arc<T> {
    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn modified(&self, path: &Path) -> TemplateResult<DateTime<Utc>> {
        (**self).modified(path)
    }

    fn read(&self, path: &Path) -> TemplateResult<String> {
        (**self).read(path)
    }
}

/// Storage backed by the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStorage;

impl TemplateStorage for FileStorage {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn modified(&self, path: &Path) -> TemplateResult<DateTime<Utc>> {
        let modified = fs::metadata(path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn read(&self, path: &Path) -> TemplateResult<String> {
        if !path.is_file() {
            return Err(TemplateError::NotFound(path.display().to_string()));
        }
        Ok(fs::read_to_string(path)?)
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    text: String,
    modified: DateTime<Utc>,
}

/// In-memory storage with explicit modification times.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<PathBuf, MemoryFile>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` at `path`, stamped with the current time.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.insert_at(path, text, Utc::now());
    }

    /// Store `text` at `path` with an explicit modification time.
    pub fn insert_at(&self, path: impl Into<PathBuf>, text: impl Into<String>, modified: DateTime<Utc>) {
        self.files.write().insert(
            path.into(),
            MemoryFile {
                text: text.into(),
                modified,
            },
        );
    }

    /// Change the modification time of an existing file.
    pub fn touch(&self, path: &Path, modified: DateTime<Utc>) -> bool {
        match self.files.write().get_mut(path) {
            Some(file) => {
                file.modified = modified;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, path: &Path) -> bool {
        self.files.write().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

impl TemplateStorage for MemoryStorage {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn modified(&self, path: &Path) -> TemplateResult<DateTime<Utc>> {
        self.files
            .read()
            .get(path)
            .map(|file| file.modified)
            .ok_or_else(|| TemplateError::NotFound(path.display().to_string()))
    }

    fn read(&self, path: &Path) -> TemplateResult<String> {
        self.files
            .read()
            .get(path)
            .map(|file| file.text.clone())
            .ok_or_else(|| TemplateError::NotFound(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_file_storage() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("index.erb");
        fs::write(&path, "hello").unwrap();

        let storage = FileStorage;
        assert!(storage.exists(&path));
        assert_eq!(storage.read(&path).unwrap(), "hello");
        assert!(storage.modified(&path).unwrap() <= Utc::now());

        let missing = temp.path().join("missing.erb");
        assert!(!storage.exists(&missing));
        assert!(matches!(storage.read(&missing), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_memory_storage_touch() {
        let storage = MemoryStorage::new();
        let path = Path::new("views/index.erb");
        let earlier = Utc::now() - Duration::hours(1);
        storage.insert_at(path, "a", earlier);
        assert_eq!(storage.modified(path).unwrap(), earlier);

        let later = Utc::now() + Duration::hours(1);
        assert!(storage.touch(path, later));
        assert_eq!(storage.modified(path).unwrap(), later);
        assert!(!storage.touch(Path::new("other.erb"), later));
    }
}
