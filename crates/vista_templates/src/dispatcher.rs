//! Picks the template flavor for a logical path by probing storage.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{TemplateError, TemplateResult};
use crate::identity::TemplateFlavor;
use crate::store::TemplateStore;

/// Resolves logical template paths below a base path.
///
/// Probe order: registered handlers (in registration order), then scripted
/// markup, then structured builder.
#[derive(Debug, Clone, Copy)]
pub struct ExtensionDispatcher<'a> {
    store: &'a TemplateStore,
    base_path: &'a Path,
}

impl<'a> ExtensionDispatcher<'a> {
    pub fn new(store: &'a TemplateStore, base_path: &'a Path) -> Self {
        Self { store, base_path }
    }

    /// `{base}/{logical}.{extension}`
    pub fn full_path(&self, logical: &str, extension: &str) -> PathBuf {
        self.base_path.join(format!("{}.{}", logical, extension))
    }

    /// True if a template for `logical` exists under `extension`.
    pub fn exists(&self, logical: &str, extension: &str) -> bool {
        self.store.template_exists(&self.full_path(logical, extension))
    }

    /// Flavor of the first template found for `logical`.
    pub fn resolve(&self, logical: &str) -> TemplateResult<TemplateFlavor> {
        if let Some(extension) = self
            .store
            .handler_extensions()
            .into_iter()
            .find(|ext| self.exists(logical, ext))
        {
            debug!("Resolved {} to handler {}", logical, extension);
            return Ok(TemplateFlavor::Delegate(extension));
        }

        let config = self.store.config();
        if self.exists(logical, &config.scripted_extension) {
            Ok(TemplateFlavor::ScriptedMarkup)
        } else if self.exists(logical, &config.builder_extension) {
            Ok(TemplateFlavor::StructuredBuilder)
        } else {
            Err(TemplateError::NotFound(format!(
                "no {}, {} or handler template found for {} in {}",
                config.scripted_extension,
                config.builder_extension,
                logical,
                self.base_path.display()
            )))
        }
    }

    /// False for partials, whose file name starts with the partial marker.
    pub fn is_public(&self, logical: &str) -> bool {
        is_public(logical, self.store.config().partial_marker)
    }
}

/// False when the final segment of `logical` starts with `marker`.
pub fn is_public(logical: &str, marker: char) -> bool {
    let name = logical.rsplit('/').next().unwrap_or(logical);
    !name.starts_with(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::context::RenderContext;
    use crate::handler::TemplateHandler;
    use crate::scope::Locals;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    struct Noop;

    impl TemplateHandler for Noop {
        fn render(&mut self, _ctx: &mut dyn RenderContext, _template: &str, _locals: &Locals) -> TemplateResult<String> {
            Ok(String::new())
        }
    }

    fn store_with(files: &[&str]) -> TemplateStore {
        let storage = MemoryStorage::new();
        for file in files {
            storage.insert(*file, "");
        }
        TemplateStore::new(RenderConfig::default(), storage)
    }

    #[test]
    fn test_resolve_prefers_scripted_over_builder() {
        let store = store_with(&["/views/feed.erb", "/views/feed.builder", "/views/rss.builder"]);
        let dispatcher = ExtensionDispatcher::new(&store, Path::new("/views"));

        assert_eq!(dispatcher.resolve("feed").unwrap(), TemplateFlavor::ScriptedMarkup);
        assert_eq!(dispatcher.resolve("rss").unwrap(), TemplateFlavor::StructuredBuilder);
        assert!(matches!(dispatcher.resolve("missing"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_resolve_prefers_handlers() {
        let store = store_with(&["/views/page.erb", "/views/page.md", "/views/page.liquid"]);
        store.register_handler("liquid", Arc::new(|| Box::new(Noop) as Box<dyn TemplateHandler>));
        store.register_handler("md", Arc::new(|| Box::new(Noop) as Box<dyn TemplateHandler>));
        let dispatcher = ExtensionDispatcher::new(&store, Path::new("/views"));

        assert_eq!(
            dispatcher.resolve("page").unwrap(),
            TemplateFlavor::Delegate("liquid".to_string())
        );
    }

    #[test]
    fn test_is_public() {
        assert!(is_public("posts/show", '_'));
        assert!(!is_public("posts/_row", '_'));
        assert!(!is_public("_footer", '_'));
    }
}
