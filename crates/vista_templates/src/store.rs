//! Shared template state: configuration, sources, compiled units, handlers.
//!
//! A store is created once per process (see [`TemplateStore::global`]) and
//! shared by every view through an `Arc`. Tests build private stores so
//! their caches never interfere.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::{TemplateError, TemplateResult};
use crate::handler::{HandlerFactory, HandlerRegistry};
use crate::identity::{CacheKey, TemplateFlavor, TemplateIdentity};
use crate::registry::CompiledRegistry;
use crate::scripted::{CompiledUnit, ScriptedCompiler};
use crate::source_cache::SourceCache;
use crate::storage::{FileStorage, TemplateStorage};

static GLOBAL_STORE: OnceLock<Arc<TemplateStore>> = OnceLock::new();

/// Process-wide template state.
pub struct TemplateStore {
    config: RenderConfig,
    storage: Box<dyn TemplateStorage>,
    sources: SourceCache,
    units: CompiledRegistry,
    handlers: RwLock<HandlerRegistry>,
    compiler: ScriptedCompiler,
    inline_sequence: AtomicU64,
}

impl TemplateStore {
    pub fn new(config: RenderConfig, storage: impl TemplateStorage + 'static) -> Self {
        let compiler = ScriptedCompiler::new(&config.trim_mode);
        Self {
            config,
            storage: Box::new(storage),
            sources: SourceCache::new(),
            units: CompiledRegistry::new(),
            handlers: RwLock::new(HandlerRegistry::new()),
            compiler,
            inline_sequence: AtomicU64::new(0),
        }
    }

    /// Store reading templates from the file system.
    pub fn with_file_storage(config: RenderConfig) -> Self {
        Self::new(config, FileStorage)
    }

    /// The process-wide store, created on first use from the environment.
    pub fn global() -> Arc<TemplateStore> {
        let store = GLOBAL_STORE.get_or_init(|| {
            let config = RenderConfig::default()
                .with_env_overrides()
                .unwrap_or_else(|e| {
                    warn!("Ignoring render config from environment: {}", e);
                    RenderConfig::default()
                });
            Arc::new(TemplateStore::with_file_storage(config))
        });
        Arc::clone(store)
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn TemplateStorage {
        self.storage.as_ref()
    }

    pub fn sources(&self) -> &SourceCache {
        &self.sources
    }

    pub fn units(&self) -> &CompiledRegistry {
        &self.units
    }

    pub fn compiler(&self) -> &ScriptedCompiler {
        &self.compiler
    }

    /// Register a delegate handler for templates with `extension`.
    pub fn register_handler(&self, extension: impl Into<String>, factory: HandlerFactory) {
        self.handlers.write().register(extension, factory);
    }

    /// Remove the delegate handler for `extension`, falling back to the
    /// built-in flavor for that extension, if any.
    pub fn unregister_handler(&self, extension: &str) -> Option<HandlerFactory> {
        self.handlers.write().unregister(extension)
    }

    pub fn handler(&self, extension: &str) -> Option<HandlerFactory> {
        self.handlers.read().get(extension)
    }

    /// Handler extensions in registration order.
    pub fn handler_extensions(&self) -> Vec<String> {
        self.handlers.read().extensions()
    }

    /// Flavor for a template stored under `extension`.
    ///
    /// Registered handlers take precedence over the built-in flavors.
    pub fn flavor_for_extension(&self, extension: &str) -> TemplateResult<TemplateFlavor> {
        if self.handlers.read().contains(extension) {
            Ok(TemplateFlavor::Delegate(extension.to_string()))
        } else if extension == self.config.scripted_extension {
            Ok(TemplateFlavor::ScriptedMarkup)
        } else if extension == self.config.builder_extension {
            Ok(TemplateFlavor::StructuredBuilder)
        } else {
            Err(TemplateError::UnknownFlavor(extension.to_string()))
        }
    }

    /// True if `path` is cached or present in storage.
    pub fn template_exists(&self, path: &Path) -> bool {
        self.sources
            .exists(self.storage(), path, self.config.cache_template_loading)
    }

    /// Read template text, invalidating the compiled unit of a scripted
    /// template whose text changed since it was last read.
    pub fn read_template(&self, path: &Path, flavor: &TemplateFlavor) -> TemplateResult<String> {
        let loaded = self
            .sources
            .load(self.storage(), path, self.config.cache_template_loading)?;
        if loaded.changed && *flavor == TemplateFlavor::ScriptedMarkup {
            self.units.invalidate(&CacheKey::Path(path.to_path_buf()));
        }
        Ok(loaded.text)
    }

    /// Compile scripted markup, or reuse the unit already registered.
    ///
    /// File templates are keyed by `path`, inline ones by their text.
    pub fn compile_scripted(
        &self,
        source: &str,
        path: Option<&Path>,
        log: bool,
    ) -> TemplateResult<Arc<CompiledUnit>> {
        let key = match path {
            Some(path) => CacheKey::Path(path.to_path_buf()),
            None => CacheKey::Inline(source.to_string()),
        };

        self.units.get_or_compile(&key, source, |serial| {
            let identity = match path {
                Some(path) => TemplateIdentity::Path(path.to_path_buf()),
                None => TemplateIdentity::Inline(self.inline_sequence.fetch_add(1, Ordering::SeqCst) + 1),
            };
            let unit = self.compiler.compile(source, key.clone(), identity, serial)?;

            if let Some(path) = path {
                if self.config.cache_template_loading {
                    self.sources.mark_loaded(path);
                }
            }
            if log {
                debug!(key = %key, name = unit.name(), "Compiled template");
            }
            Ok(unit)
        })
    }

    /// Drop every cached source and compiled unit.
    pub fn reset(&self) {
        self.sources.clear();
        self.units.clear();
    }
}

impl std::fmt::Debug for TemplateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateStore")
            .field("config", &self.config)
            .field("sources", &self.sources.len())
            .field("units", &self.units)
            .field("handlers", &*self.handlers.read())
            .finish()
    }
}
