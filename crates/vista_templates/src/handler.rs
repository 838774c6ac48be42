//! Externally registered template handlers.

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::RenderContext;
use crate::error::TemplateResult;
use crate::scope::Locals;

/// A template flavor whose compilation and execution is owned elsewhere.
///
/// A fresh handler is built for every render; it reaches back into the
/// rendering view through `ctx` for nested renders.
pub trait TemplateHandler {
    fn render(&mut self, ctx: &mut dyn RenderContext, template: &str, locals: &Locals) -> TemplateResult<String>;
}

/// Builds a handler for one render call.
pub type HandlerFactory = Arc<dyn Fn() -> Box<dyn TemplateHandler> + Send + Sync>;

/// Handlers keyed by template extension, in registration order.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<(String, HandlerFactory)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler factory for `extension`.
    ///
    /// Re-registering an extension replaces the factory but keeps its
    /// original position in the dispatch order.
    pub fn register(&mut self, extension: impl Into<String>, factory: HandlerFactory) {
        let extension = extension.into();
        info!("Registering template handler: {}", extension);
        match self.handlers.iter_mut().find(|(ext, _)| *ext == extension) {
            Some((_, existing)) => *existing = factory,
            None => self.handlers.push((extension, factory)),
        }
    }

    pub fn get(&self, extension: &str) -> Option<HandlerFactory> {
        self.handlers
            .iter()
            .find(|(ext, _)| ext == extension)
            .map(|(_, factory)| Arc::clone(factory))
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.handlers.iter().any(|(ext, _)| ext == extension)
    }

    /// Registered extensions in dispatch order.
    pub fn extensions(&self) -> Vec<String> {
        self.handlers.iter().map(|(ext, _)| ext.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn unregister(&mut self, extension: &str) -> Option<HandlerFactory> {
        debug!("Unregistering template handler: {}", extension);
        let index = self.handlers.iter().position(|(ext, _)| ext == extension)?;
        Some(self.handlers.remove(index).1)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.extensions())
            .finish()
    }
}
