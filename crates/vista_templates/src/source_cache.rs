//! Cache of raw template sources with modification-time staleness checks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::TemplateResult;
use crate::storage::TemplateStorage;

/// A cached template source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub text: String,
    /// When the text was read; absent while caching is disabled
    pub loaded_at: Option<DateTime<Utc>>,
}

/// Outcome of a [`SourceCache::load`].
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub text: String,
    /// True when the text was (re)read from storage on this call
    pub reloaded: bool,
    /// True when the re-read replaced different cached text
    pub changed: bool,
}

/// Raw template text keyed by resolved path.
///
/// Entries are replaced whole under the write lock, so readers never see
/// a partially written entry.
#[derive(Debug, Default)]
pub struct SourceCache {
    entries: RwLock<HashMap<PathBuf, SourceEntry>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the text for `path`, re-reading storage when needed.
    ///
    /// With `caching` off every call re-reads. With it on, the cached text
    /// is returned unless there is no entry or the storage modification
    /// time is newer than the entry's load time.
    pub fn load(
        &self,
        storage: &dyn TemplateStorage,
        path: &Path,
        caching: bool,
    ) -> TemplateResult<LoadedSource> {
        if caching {
            let cached = self.entries.read().get(path).cloned();
            if let Some(SourceEntry {
                text,
                loaded_at: Some(loaded_at),
            }) = cached
            {
                if storage.modified(path)? <= loaded_at {
                    return Ok(LoadedSource {
                        text,
                        reloaded: false,
                        changed: false,
                    });
                }
                debug!("Template source changed on disk: {:?}", path);
            }
        }

        let text = storage.read(path)?;
        let entry = SourceEntry {
            text: text.clone(),
            loaded_at: caching.then(Utc::now),
        };
        let previous = self.entries.write().insert(path.to_path_buf(), entry);
        let changed = previous.map_or(false, |previous| previous.text != text);
        debug!("Read template source: {:?} (changed: {})", path, changed);

        Ok(LoadedSource {
            text,
            reloaded: true,
            changed,
        })
    }

    /// True if `path` is cached (with caching on) or present in storage.
    pub fn exists(&self, storage: &dyn TemplateStorage, path: &Path, caching: bool) -> bool {
        (caching && self.entries.read().contains_key(path)) || storage.exists(path)
    }

    /// Refresh the load time of an already cached entry.
    pub fn mark_loaded(&self, path: &Path) {
        if let Some(entry) = self.entries.write().get_mut(path) {
            entry.loaded_at = Some(Utc::now());
        }
    }

    pub fn get(&self, path: &Path) -> Option<SourceEntry> {
        self.entries.read().get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        debug!("Clearing template source cache");
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::storage::{MemoryStorage, MockTemplateStorage};
    use chrono::Duration;

    #[test]
    fn test_disabled_caching_always_rereads() {
        let storage = MemoryStorage::new();
        let path = Path::new("views/index.erb");
        let cache = SourceCache::new();

        storage.insert(path, "first");
        assert_eq!(cache.load(&storage, path, false).unwrap().text, "first");

        storage.insert_at(path, "second", Utc::now() - Duration::days(1));
        let loaded = cache.load(&storage, path, false).unwrap();
        assert_eq!(loaded.text, "second");
        assert!(loaded.reloaded && loaded.changed);
        assert_eq!(cache.get(path).unwrap().loaded_at, None);

        let loaded = cache.load(&storage, path, false).unwrap();
        assert!(loaded.reloaded);
        assert!(!loaded.changed);
    }

    #[test]
    fn test_enabled_caching_waits_for_newer_mtime() {
        let storage = MemoryStorage::new();
        let path = Path::new("views/index.erb");
        let cache = SourceCache::new();

        storage.insert_at(path, "first", Utc::now() - Duration::hours(2));
        let loaded = cache.load(&storage, path, true).unwrap();
        assert!(loaded.reloaded && !loaded.changed);

        // Older than the load time: stays cached
        storage.insert_at(path, "second", Utc::now() - Duration::hours(1));
        let loaded = cache.load(&storage, path, true).unwrap();
        assert_eq!(loaded.text, "first");
        assert!(!loaded.reloaded);

        storage.touch(path, Utc::now() + Duration::hours(1));
        let loaded = cache.load(&storage, path, true).unwrap();
        assert_eq!(loaded.text, "second");
        assert!(loaded.changed);
    }

    #[test]
    fn test_cached_read_only_hits_storage_once() {
        let path = Path::new("views/show.erb");
        let mut storage = MockTemplateStorage::new();
        storage
            .expect_read()
            .times(1)
            .returning(|_| Ok("cached".to_string()));
        storage
            .expect_modified()
            .times(2)
            .returning(|_| Ok(Utc::now() - Duration::hours(1)));

        let cache = SourceCache::new();
        for _ in 0..3 {
            assert_eq!(cache.load(&storage, path, true).unwrap().text, "cached");
        }
    }

    #[test]
    fn test_missing_source_is_not_cached() {
        let storage = MemoryStorage::new();
        let cache = SourceCache::new();
        let result = cache.load(&storage, Path::new("nope.erb"), true);
        assert!(matches!(result, Err(TemplateError::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_exists_consults_cache_only_when_enabled() {
        let storage = MemoryStorage::new();
        let path = Path::new("gone.erb");
        let cache = SourceCache::new();
        storage.insert(path, "x");
        cache.load(&storage, path, true).unwrap();
        storage.remove(path);

        assert!(cache.exists(&storage, path, true));
        assert!(!cache.exists(&storage, path, false));
    }
}
