//! The environment executing templates and handlers talk to.

use serde_json::Value;

use crate::error::TemplateResult;
use crate::options::RenderOptions;
use crate::scope::{Locals, SavedFrame};

/// Variable lookup and nested rendering for an executing template.
///
/// Implemented by [`crate::View`]. Compiled units never see the view's
/// internals, only this interface.
pub trait RenderContext {
    /// Value of a local; `None` if the name was never bound.
    fn local(&self, name: &str) -> Option<Value>;

    /// Value of an instance variable (`@name`).
    fn instance(&self, name: &str) -> Option<Value>;

    /// Set an instance variable for the rest of the render.
    fn set_instance(&mut self, name: &str, value: Value);

    /// Bind locals; the returned frame must be passed to [`RenderContext::restore`].
    fn bind(&mut self, locals: Locals) -> SavedFrame;

    /// Undo a [`RenderContext::bind`].
    fn restore(&mut self, frame: SavedFrame);

    /// Render a nested template.
    fn render(&mut self, options: RenderOptions) -> TemplateResult<String>;
}
