//! Rendering partials by name, singly or once per collection element.

use serde_json::Value;

use crate::context::RenderContext;
use crate::error::TemplateResult;
use crate::options::RenderOptions;
use crate::scope::Locals;

/// Maps partial names onto template files and renders them through a
/// [`RenderContext`].
#[derive(Debug, Clone, Copy)]
pub struct PartialRenderer {
    marker: char,
}

impl PartialRenderer {
    pub fn new(marker: char) -> Self {
        Self { marker }
    }

    /// Split `dir/name` into the logical file path `dir/_name` and the
    /// local name `name`.
    pub fn partial_pieces(&self, name: &str) -> (String, String) {
        let (dir, local) = match name.rsplit_once('/') {
            Some((dir, local)) => (Some(dir), local),
            None => (None, name),
        };
        let file = format!("{}{}", self.marker, local);
        let path = match dir {
            Some(dir) => format!("{}/{}", dir, file),
            None => file,
        };
        (path, local.to_string())
    }

    /// Render `name` for one object.
    ///
    /// Without an object the assign of the same name is used, or null.
    pub fn render_partial(
        &self,
        ctx: &mut dyn RenderContext,
        name: &str,
        object: Option<Value>,
        mut locals: Locals,
    ) -> TemplateResult<String> {
        let (path, local) = self.partial_pieces(name);
        let object = object
            .or_else(|| ctx.instance(&local))
            .unwrap_or(Value::Null);
        locals.entry(local).or_insert(object);

        ctx.render(RenderOptions::File {
            path,
            use_full_path: true,
            locals,
        })
    }

    /// Render `name` once per element, with `spacer` rendered between
    /// consecutive elements.
    pub fn render_collection(
        &self,
        ctx: &mut dyn RenderContext,
        name: &str,
        collection: &[Value],
        spacer: Option<&str>,
        locals: &Locals,
    ) -> TemplateResult<String> {
        let (_, local) = self.partial_pieces(name);
        let counter = format!("{}_counter", local);

        let mut output = String::new();
        for (index, item) in collection.iter().enumerate() {
            if index > 0 {
                if let Some(spacer) = spacer {
                    output.push_str(&self.render_partial(ctx, spacer, None, Locals::new())?);
                }
            }
            let mut item_locals = locals.clone();
            item_locals.insert(counter.clone(), Value::from(index));
            output.push_str(&self.render_partial(ctx, name, Some(item.clone()), item_locals)?);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{SavedFrame, Scope};
    use serde_json::json;
    use std::collections::HashMap;

    /// Records file renders as `path(local=value)`.
    #[derive(Default)]
    struct Recorder {
        scope: Scope,
        assigns: HashMap<String, Value>,
        calls: Vec<String>,
    }

    impl RenderContext for Recorder {
        fn local(&self, name: &str) -> Option<Value> {
            self.scope.local(name)
        }

        fn instance(&self, name: &str) -> Option<Value> {
            self.assigns.get(name).cloned()
        }

        fn set_instance(&mut self, name: &str, value: Value) {
            self.assigns.insert(name.to_string(), value);
        }

        fn bind(&mut self, locals: Locals) -> SavedFrame {
            self.scope.bind(locals)
        }

        fn restore(&mut self, frame: SavedFrame) {
            self.scope.restore(frame)
        }

        fn render(&mut self, options: RenderOptions) -> TemplateResult<String> {
            let RenderOptions::File { path, locals, .. } = options else {
                panic!("partials render files");
            };
            let mut names: Vec<_> = locals.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            names.sort();
            let call = format!("{}({})", path, names.join(","));
            self.calls.push(call.clone());
            Ok(call)
        }
    }

    #[test]
    fn test_partial_pieces() {
        let partials = PartialRenderer::new('_');
        assert_eq!(
            partials.partial_pieces("posts/row"),
            ("posts/_row".to_string(), "row".to_string())
        );
        assert_eq!(
            partials.partial_pieces("footer"),
            ("_footer".to_string(), "footer".to_string())
        );
    }

    #[test]
    fn test_render_partial_defaults_to_assign() {
        let mut ctx = Recorder::default();
        ctx.assigns.insert("user".to_string(), json!("ann"));
        let partials = PartialRenderer::new('_');

        let out = partials.render_partial(&mut ctx, "users/user", None, Locals::new()).unwrap();
        assert_eq!(out, "users/_user(user=\"ann\")");

        let out = partials.render_partial(&mut ctx, "card", None, Locals::new()).unwrap();
        assert_eq!(out, "_card(card=null)");
    }

    #[test]
    fn test_render_collection_interleaves_spacer() {
        let mut ctx = Recorder::default();
        let partials = PartialRenderer::new('_');

        let out = partials
            .render_collection(&mut ctx, "row", &[json!("a"), json!("b"), json!("c")], Some("sep"), &Locals::new())
            .unwrap();

        assert_eq!(ctx.calls.len(), 5);
        assert_eq!(
            out,
            "_row(row=\"a\",row_counter=0)_sep(sep=null)_row(row=\"b\",row_counter=1)_sep(sep=null)_row(row=\"c\",row_counter=2)"
        );
    }

    #[test]
    fn test_render_empty_collection() {
        let mut ctx = Recorder::default();
        let partials = PartialRenderer::new('_');

        let out = partials.render_collection(&mut ctx, "row", &[], Some("sep"), &Locals::new()).unwrap();
        assert_eq!(out, "");
        assert!(ctx.calls.is_empty());
    }
}
