//! The render coordinator.
//!
//! A [`View`] is one logical render session: it owns the variable scope and
//! the response headers, and shares the process-wide [`TemplateStore`].
//! Every call shape ends up in [`View::render_file`] or
//! [`View::render_template`]; file renders are the boundary at which
//! failures gain template context.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::builder;
use crate::context::RenderContext;
use crate::dispatcher::ExtensionDispatcher;
use crate::error::{TemplateError, TemplateFailure, TemplateResult};
use crate::identity::TemplateFlavor;
use crate::options::RenderOptions;
use crate::partials::PartialRenderer;
use crate::scope::{Locals, SavedFrame, Scope};
use crate::scripted::CompiledUnit;
use crate::store::TemplateStore;

/// Response header defaulted by builder templates.
pub const CONTENT_TYPE: &str = "Content-Type";

/// A render session over templates below `base_path`.
#[derive(Debug)]
pub struct View {
    store: Arc<TemplateStore>,
    base_path: PathBuf,
    scope: Scope,
    headers: HashMap<String, String>,
    first_render: Option<String>,
    log_compiles: bool,
    render_depth: usize,
}

impl View {
    pub fn new(store: Arc<TemplateStore>, base_path: impl Into<PathBuf>) -> Self {
        Self::with_assigns(store, base_path, HashMap::new())
    }

    /// Create a view whose templates see `assigns` as `@name`.
    pub fn with_assigns(
        store: Arc<TemplateStore>,
        base_path: impl Into<PathBuf>,
        assigns: HashMap<String, Value>,
    ) -> Self {
        Self {
            store,
            base_path: base_path.into(),
            scope: Scope::with_assigns(assigns),
            headers: HashMap::new(),
            first_render: None,
            log_compiles: true,
            render_depth: 0,
        }
    }

    /// Set a persistent assign, visible from the next render call on.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.scope.assign(name, value);
    }

    pub fn store(&self) -> &Arc<TemplateStore> {
        &self.store
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// The first template path this view rendered.
    pub fn first_render(&self) -> Option<&str> {
        self.first_render.as_deref()
    }

    /// Toggle the debug log line written for each compile.
    pub fn set_compile_logging(&mut self, enabled: bool) {
        self.log_compiles = enabled;
    }

    pub fn dispatcher(&self) -> ExtensionDispatcher<'_> {
        ExtensionDispatcher::new(&self.store, &self.base_path)
    }

    /// Render any call shape.
    pub fn render(&mut self, options: RenderOptions) -> TemplateResult<String> {
        match options {
            RenderOptions::Path(path) => self.render_file(&path, true, Locals::new()),
            RenderOptions::File {
                path,
                use_full_path,
                locals,
            } => self.render_file(&path, use_full_path, locals),
            RenderOptions::Inline { text, flavor, locals } => {
                let extension = flavor.unwrap_or_else(|| self.store.config().scripted_extension.clone());
                self.render_template(&extension, &text, None, locals)
            }
            RenderOptions::Partial { name, object, locals } => {
                self.partials().render_partial(self, &name, object, locals)
            }
            RenderOptions::PartialCollection {
                name,
                collection,
                spacer,
                locals,
            } => self
                .partials()
                .render_collection(self, &name, &collection, spacer.as_deref(), &locals),
        }
    }

    /// Render a template file.
    ///
    /// With `use_full_path` the path is logical and the flavor is resolved
    /// by probing storage; otherwise the path carries its extension.
    pub fn render_file(&mut self, path: &str, use_full_path: bool, locals: Locals) -> TemplateResult<String> {
        if self.first_render.is_none() {
            self.first_render = Some(path.to_string());
        }

        let (full_path, flavor) = self.locate(path, use_full_path)?;
        let source = self.store.read_template(&full_path, &flavor)?;
        let file_name = full_path.display().to_string();
        debug!("Rendering {} as {}", file_name, flavor);

        match self.render_flavor(&flavor, &source, Some(&full_path), locals) {
            Ok(output) => Ok(output),
            Err(TemplateError::Failure(mut failure)) => {
                failure.sub_template_of(file_name);
                Err(TemplateError::Failure(failure))
            }
            Err(err) => Err(TemplateError::Failure(Box::new(TemplateFailure::new(
                self.base_path.clone(),
                Some(file_name),
                self.scope.instance_snapshot(),
                source,
                err,
            )))),
        }
    }

    /// Render template text of the flavor stored under `extension`.
    pub fn render_template(
        &mut self,
        extension: &str,
        source: &str,
        path: Option<&Path>,
        locals: Locals,
    ) -> TemplateResult<String> {
        let flavor = self.store.flavor_for_extension(extension)?;
        self.render_flavor(&flavor, source, path, locals)
    }

    /// Compile a scripted template without running it.
    pub fn compile(&self, path: &str) -> TemplateResult<Arc<CompiledUnit>> {
        let dispatcher = self.dispatcher();
        let flavor = dispatcher.resolve(path)?;
        if flavor != TemplateFlavor::ScriptedMarkup {
            return Err(TemplateError::runtime(format!(
                "{} is a {} template; only scripted markup compiles to a unit",
                path, flavor
            )));
        }
        let full_path = dispatcher.full_path(path, flavor.extension(self.store.config()));
        let source = self.store.read_template(&full_path, &flavor)?;
        self.store.compile_scripted(&source, Some(&full_path), self.log_compiles)
    }

    fn locate(&self, path: &str, use_full_path: bool) -> TemplateResult<(PathBuf, TemplateFlavor)> {
        if use_full_path {
            let dispatcher = self.dispatcher();
            let flavor = dispatcher.resolve(path)?;
            let full_path = dispatcher.full_path(path, flavor.extension(self.store.config()));
            return Ok((full_path, flavor));
        }

        let full_path = self.base_path.join(path);
        let extension = path.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
        let flavor = self.store.flavor_for_extension(extension)?;
        Ok((full_path, flavor))
    }

    fn render_flavor(
        &mut self,
        flavor: &TemplateFlavor,
        source: &str,
        path: Option<&Path>,
        locals: Locals,
    ) -> TemplateResult<String> {
        // Assigns seed each top-level render; nested renders keep the
        // instance values of the template that included them.
        if self.render_depth == 0 {
            self.scope.apply_assigns();
        }
        self.render_depth += 1;
        let result = self.dispatch_flavor(flavor, source, path, locals);
        self.render_depth -= 1;
        result
    }

    fn dispatch_flavor(
        &mut self,
        flavor: &TemplateFlavor,
        source: &str,
        path: Option<&Path>,
        locals: Locals,
    ) -> TemplateResult<String> {
        match flavor {
            TemplateFlavor::Delegate(extension) => {
                let factory = self
                    .store
                    .handler(extension)
                    .ok_or_else(|| TemplateError::UnknownFlavor(extension.clone()))?;
                let mut handler = factory();
                handler.render(self, source, &locals)
            }
            TemplateFlavor::ScriptedMarkup => {
                let unit = self.store.compile_scripted(source, path, self.log_compiles)?;
                self.with_locals(locals, |view| unit.call(view))
            }
            TemplateFlavor::StructuredBuilder => {
                let indent = self.store.config().builder_indent;
                let output = self.with_locals(locals, |view| builder::evaluate(source, view, indent))?;
                if !self.headers.keys().any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE)) {
                    let content_type = self.store.config().builder_content_type.clone();
                    self.headers.insert(CONTENT_TYPE.to_string(), content_type);
                }
                Ok(output)
            }
        }
    }

    /// Run `f` with `locals` bound, restoring them whatever `f` returns.
    fn with_locals<F>(&mut self, locals: Locals, f: F) -> TemplateResult<String>
    where
        F: FnOnce(&mut Self) -> TemplateResult<String>,
    {
        let frame = self.scope.bind(locals);
        let result = f(self);
        self.scope.restore(frame);
        result
    }

    fn partials(&self) -> PartialRenderer {
        PartialRenderer::new(self.store.config().partial_marker)
    }
}

impl RenderContext for View {
    fn local(&self, name: &str) -> Option<Value> {
        self.scope.local(name)
    }

    fn instance(&self, name: &str) -> Option<Value> {
        self.scope.instance(name).cloned()
    }

    fn set_instance(&mut self, name: &str, value: Value) {
        self.scope.set_instance(name, value);
    }

    fn bind(&mut self, locals: Locals) -> SavedFrame {
        self.scope.bind(locals)
    }

    fn restore(&mut self, frame: SavedFrame) {
        self.scope.restore(frame);
    }

    fn render(&mut self, options: RenderOptions) -> TemplateResult<String> {
        View::render(self, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::handler::TemplateHandler;
    use crate::storage::MemoryStorage;
    use serde_json::json;

    fn view_with(files: &[(&str, &str)]) -> View {
        let storage = MemoryStorage::new();
        for (path, text) in files {
            storage.insert(format!("/views/{}", path), *text);
        }
        let store = Arc::new(TemplateStore::new(RenderConfig::default(), storage));
        View::new(store, "/views")
    }

    fn locals(pairs: &[(&str, Value)]) -> Locals {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    /// Renders `<name>` through the view, upper-casing the template text.
    struct Shout;

    impl TemplateHandler for Shout {
        fn render(&mut self, ctx: &mut dyn RenderContext, template: &str, locals: &Locals) -> TemplateResult<String> {
            let who = locals.get("who").map(crate::value::to_output).unwrap_or_default();
            let nested = ctx.render(RenderOptions::path("greeting"))?;
            Ok(format!("{} {} {}", template.trim().to_uppercase(), who, nested))
        }
    }

    #[test]
    fn test_render_path_with_locals() {
        let mut view = view_with(&[("hello.erb", "Hello <%= name %>!")]);
        let out = view
            .render(RenderOptions::path("hello").with_local("name", json!("Ann")))
            .unwrap();

        assert_eq!(out, "Hello Ann!");
        assert_eq!(view.first_render(), Some("hello"));
        assert!(view.scope().locals().is_empty());
        assert_eq!(view.scope().depth(), 0);
    }

    #[test]
    fn test_assigns_are_visible_as_instance_values() {
        let mut view = view_with(&[("title.erb", "<%= @title %>/<% @title = \"changed\" %><%= @title %>")]);
        view.assign("title", json!("Home"));

        assert_eq!(view.render(RenderOptions::path("title")).unwrap(), "Home/changed");
        assert_eq!(view.render(RenderOptions::path("title")).unwrap(), "Home/changed");
    }

    #[test]
    fn test_nested_render_keeps_outer_instance_values() {
        let mut view = view_with(&[
            ("outer.erb", "<% @title = \"changed\" %><%= render(\"inner\") %>|<%= @title %>"),
            ("inner.erb", "[<%= @title %>]"),
        ]);
        view.assign("title", json!("Home"));

        assert_eq!(view.render(RenderOptions::path("outer")).unwrap(), "[changed]|changed");
        assert_eq!(view.render(RenderOptions::path("inner")).unwrap(), "[Home]");
    }

    #[test]
    fn test_nested_failure_leaves_view_reusable() {
        let mut view = view_with(&[
            ("outer.erb", "<% @title = \"changed\" %><%= render(\"missing\") %>"),
            ("title.erb", "<%= @title %>"),
        ]);
        view.assign("title", json!("Home"));

        assert!(view.render(RenderOptions::path("outer")).is_err());
        assert_eq!(view.render(RenderOptions::path("title")).unwrap(), "Home");
    }

    #[test]
    fn test_render_file_without_full_path() {
        let mut view = view_with(&[("raw.erb", "<%= 1 %>")]);
        let out = view
            .render(RenderOptions::file("raw.erb").use_full_path(false))
            .unwrap();
        assert_eq!(out, "1");

        let err = view
            .render(RenderOptions::file("raw.txt").use_full_path(false))
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFlavor(ref ext) if ext == "txt"));
    }

    #[test]
    fn test_failure_is_wrapped_with_context() {
        let mut view = view_with(&[("broken.erb", "ok\n<% raise(\"boom\") %>")]);
        view.assign("user", json!("ann"));

        let err = view
            .render(RenderOptions::path("broken").with_local("x", json!(1)))
            .unwrap_err();
        let failure = err.as_failure().expect("wrapped failure");

        assert_eq!(failure.chain(), ["/views/broken.erb"]);
        assert_eq!(failure.assigns().get("user"), Some(&json!("ann")));
        assert_eq!(failure.line_number(), Some(2));
        assert!(matches!(failure.cause(), TemplateError::Runtime { message, .. } if message == "boom"));
        assert!(view.scope().locals().is_empty());
    }

    #[test]
    fn test_builder_defaults_content_type_once() {
        let mut view = view_with(&[("feed.builder", "feed do\n  title @title\nend")]);
        view.assign("title", json!("News"));

        let out = view.render(RenderOptions::path("feed")).unwrap();
        assert_eq!(out, "<feed>\n  <title>News</title>\n</feed>\n");
        assert_eq!(view.headers().get(CONTENT_TYPE).map(String::as_str), Some("application/xml"));

        let mut view = view_with(&[("feed.builder", "feed")]);
        view.headers_mut()
            .insert("content-type".to_string(), "application/atom+xml".to_string());
        view.render(RenderOptions::path("feed")).unwrap();
        assert_eq!(view.headers().len(), 1);
        assert!(view.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_delegate_handler_renders_nested() {
        let mut view = view_with(&[("page.shout", "welcome"), ("page.erb", "never"), ("greeting.erb", "hi")]);
        view.store()
            .register_handler("shout", Arc::new(|| Box::new(Shout) as Box<dyn TemplateHandler>));

        let out = view
            .render(RenderOptions::path("page").with_local("who", json!("bob")))
            .unwrap();
        assert_eq!(out, "WELCOME bob hi");
    }

    #[test]
    fn test_inline_render_uses_scripted_flavor_by_default() {
        let mut view = view_with(&[]);
        let out = view
            .render(RenderOptions::inline("<%= n %>+<%= n %>").with_local("n", json!(2)))
            .unwrap();
        assert_eq!(out, "2+2");
        assert!(view.first_render().is_none());
    }

    #[test]
    fn test_compile_only_scripted() {
        let view = view_with(&[("index.erb", "x"), ("feed.builder", "feed")]);

        let unit = view.compile("index").unwrap();
        assert_eq!(unit.name(), "_run_scripted_views_index_erb");
        assert!(Arc::ptr_eq(&unit, &view.compile("index").unwrap()));
        assert!(view.compile("feed").is_err());
        assert!(matches!(view.compile("missing"), Err(TemplateError::NotFound(_))));
    }
}
