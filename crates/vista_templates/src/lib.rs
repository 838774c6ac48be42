//! # vista_templates
//!
//! Template compilation, caching and rendering for vista.
//!
//! Templates are looked up by logical path below a base directory and come
//! in three flavors:
//!
//! - Scripted markup (`.erb`): literal text with embedded `<% %>` code,
//!   compiled once into a cached unit
//! - Structured builder (`.builder`): a line-oriented XML builder script,
//!   evaluated fresh on every render
//! - Delegates: any extension with a registered [`TemplateHandler`]
//!
//! Source text and compiled units live in a shared [`TemplateStore`]; each
//! [`View`] owns the variables of one render session and wraps failures into
//! a [`TemplateFailure`] naming every template on the include path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use vista_templates::{RenderConfig, RenderOptions, TemplateStore, View};
//!
//! let store = Arc::new(TemplateStore::with_file_storage(RenderConfig::default()));
//! let mut view = View::new(store, "templates");
//! view.assign("title", json!("Posts"));
//!
//! let html = view
//!     .render(RenderOptions::path("posts/index").with_local("page", json!(1)))
//!     .unwrap();
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
mod expr;
pub mod handler;
pub mod identity;
pub mod options;
pub mod partials;
pub mod registry;
pub mod scope;
pub mod scripted;
pub mod source_cache;
pub mod storage;
pub mod store;
pub mod value;
pub mod view;

pub use config::RenderConfig;
pub use context::RenderContext;
pub use dispatcher::ExtensionDispatcher;
pub use error::{TemplateError, TemplateFailure, TemplateResult};
pub use handler::{HandlerFactory, HandlerRegistry, TemplateHandler};
pub use identity::{CacheKey, TemplateFlavor, TemplateIdentity};
pub use options::RenderOptions;
pub use partials::PartialRenderer;
pub use registry::CompiledRegistry;
pub use scope::{Locals, SavedFrame, SavedState, Scope};
pub use scripted::{CompiledUnit, ScriptedCompiler, TrimMode};
pub use source_cache::{LoadedSource, SourceCache, SourceEntry};
pub use storage::{FileStorage, MemoryStorage, TemplateStorage};
pub use store::TemplateStore;
pub use view::View;
