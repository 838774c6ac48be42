//! Registry of compiled scripted-markup units.
//!
//! Each key owns a slot guarded by its own mutex. The first caller to reach
//! an empty slot compiles while holding the slot lock; concurrent callers for
//! the same key block on it and then reuse the stored unit, so a key is never
//! compiled twice at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::TemplateResult;
use crate::identity::CacheKey;
use crate::scripted::CompiledUnit;

type Slot = Arc<Mutex<Option<Arc<CompiledUnit>>>>;

/// Compiled units keyed by [`CacheKey`].
#[derive(Default)]
pub struct CompiledRegistry {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    compilations: AtomicUsize,
}

impl CompiledRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The unit registered under `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CompiledUnit>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let unit = slot.lock().clone();
        unit
    }

    /// Return the unit for `key` compiled from `source`, compiling it when
    /// the slot is empty or holds a unit built from other text.
    ///
    /// `compile` receives the serial number the new unit should carry.
    pub fn get_or_compile<F>(
        &self,
        key: &CacheKey,
        source: &str,
        compile: F,
    ) -> TemplateResult<Arc<CompiledUnit>>
    where
        F: FnOnce(usize) -> TemplateResult<CompiledUnit>,
    {
        let slot = self.slots.lock().entry(key.clone()).or_default().clone();

        let mut guard = slot.lock();
        if let Some(unit) = guard.as_ref() {
            if unit.source() == source {
                return Ok(Arc::clone(unit));
            }
            debug!("Compiled template {} is stale, recompiling", key);
        }

        let serial = self.compilations.fetch_add(1, Ordering::SeqCst) + 1;
        let unit = Arc::new(compile(serial)?);
        *guard = Some(Arc::clone(&unit));
        Ok(unit)
    }

    /// Drop the unit for `key` so the next lookup recompiles.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.slots.lock().remove(key).is_some();
        if removed {
            debug!("Invalidated compiled template: {}", key);
        }
        removed
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of compiled units currently registered.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compilations attempted since the registry was created.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        debug!("Clearing compiled template registry");
        self.slots.lock().clear();
    }
}

impl std::fmt::Debug for CompiledRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRegistry")
            .field("keys", &self.slots.lock().keys().collect::<Vec<_>>())
            .field("compilations", &self.compilations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedCompiler;
    use crate::identity::TemplateIdentity;
    use std::path::PathBuf;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn compile(source: &str, key: &CacheKey, serial: usize) -> TemplateResult<CompiledUnit> {
        ScriptedCompiler::new("-").compile(
            source,
            key.clone(),
            TemplateIdentity::Inline(serial as u64),
            serial,
        )
    }

    #[test]
    fn test_reuses_compiled_unit() {
        let registry = CompiledRegistry::new();
        let key = CacheKey::Path(PathBuf::from("views/index.erb"));

        let first = registry.get_or_compile(&key, "a", |serial| compile("a", &key, serial)).unwrap();
        let second = registry.get_or_compile(&key, "a", |serial| compile("a", &key, serial)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.compilations(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_different_source_replaces_unit() {
        let registry = CompiledRegistry::new();
        let key = CacheKey::Path(PathBuf::from("views/index.erb"));

        let old = registry.get_or_compile(&key, "one", |serial| compile("one", &key, serial)).unwrap();
        let new = registry.get_or_compile(&key, "two", |serial| compile("two", &key, serial)).unwrap();
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.source(), "two");

        let again = registry.get_or_compile(&key, "two", |serial| compile("two", &key, serial)).unwrap();
        assert!(Arc::ptr_eq(&new, &again));
        assert_eq!(registry.compilations(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalidate_forces_recompile() {
        let registry = CompiledRegistry::new();
        let key = CacheKey::Path(PathBuf::from("views/index.erb"));

        let first = registry.get_or_compile(&key, "a", |serial| compile("a", &key, serial)).unwrap();
        assert!(registry.invalidate(&key));
        assert!(!registry.contains(&key));

        let second = registry.get_or_compile(&key, "a", |serial| compile("a", &key, serial)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.serial(), second.serial());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_compile_is_not_registered() {
        let registry = CompiledRegistry::new();
        let key = CacheKey::Inline("<% end %>".to_string());

        assert!(registry
            .get_or_compile(&key, "<% end %>", |serial| compile("<% end %>", &key, serial))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_compile_runs_once() {
        let registry = Arc::new(CompiledRegistry::new());
        let key = CacheKey::Path(PathBuf::from("views/race.erb"));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                let key = key.clone();
                thread::spawn(move || {
                    barrier.wait();
                    registry
                        .get_or_compile(&key, "hello", |serial| {
                            thread::sleep(Duration::from_millis(20));
                            compile("hello", &key, serial)
                        })
                        .unwrap()
                })
            })
            .collect();

        let units: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(registry.compilations(), 1);
        assert!(units.iter().all(|unit| Arc::ptr_eq(unit, &units[0])));
    }
}
