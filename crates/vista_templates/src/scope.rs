//! Variable binding scope of a view.
//!
//! A scope holds the persistent assigns set when the view is built, the
//! instance values templates read as `@name` (re-seeded from the assigns on
//! every render call), and the per-call locals. Locals are bound and
//! restored in strictly nested pairs; the saved prior values live on an
//! explicit stack so recursive renders cannot clobber each other.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

/// Name to value mapping passed to a render call.
pub type Locals = HashMap<String, Value>;

/// Prior values of the keys touched by one [`Scope::bind`].
#[derive(Debug, Clone, PartialEq)]
pub struct SavedState {
    prior: Vec<(String, Option<Value>)>,
}

impl SavedState {
    /// Names touched by the bind, in bind order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.prior.iter().map(|(name, _)| name.as_str())
    }
}

/// Handle returned by [`Scope::bind`], consumed by [`Scope::restore`].
#[must_use = "every bind must be restored"]
#[derive(Debug)]
pub struct SavedFrame {
    depth: usize,
}

/// Per-view variable environment.
#[derive(Debug, Default, Clone)]
pub struct Scope {
    assigns: HashMap<String, Value>,
    instance: HashMap<String, Value>,
    locals: Locals,
    accessors: HashSet<String>,
    saved: Vec<SavedState>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assigns(assigns: HashMap<String, Value>) -> Self {
        Self {
            assigns,
            ..Self::default()
        }
    }

    /// Set a persistent assign.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.assigns.insert(name.into(), value);
    }

    pub fn assigns(&self) -> &HashMap<String, Value> {
        &self.assigns
    }

    /// Re-apply the persistent assigns over the instance values.
    pub fn apply_assigns(&mut self) {
        for (name, value) in &self.assigns {
            self.instance.insert(name.clone(), value.clone());
        }
    }

    pub fn instance(&self, name: &str) -> Option<&Value> {
        self.instance.get(name)
    }

    pub fn set_instance(&mut self, name: impl Into<String>, value: Value) {
        self.instance.insert(name.into(), value);
    }

    /// Copy of the instance values, used for failure context.
    pub fn instance_snapshot(&self) -> HashMap<String, Value> {
        self.instance.clone()
    }

    /// Register a local name so templates can reference it.
    ///
    /// Returns `false` when the name was already registered.
    pub fn register_accessor(&mut self, name: &str) -> bool {
        if self.accessors.contains(name) {
            return false;
        }
        debug!("Registering local accessor: {}", name);
        self.accessors.insert(name.to_string())
    }

    pub fn has_accessor(&self, name: &str) -> bool {
        self.accessors.contains(name)
    }

    /// Look up a local.
    ///
    /// A name seen before on this scope but currently unbound reads as
    /// null; a name never bound is unknown.
    pub fn local(&self, name: &str) -> Option<Value> {
        match self.locals.get(name) {
            Some(value) => Some(value.clone()),
            None if self.accessors.contains(name) => Some(Value::Null),
            None => None,
        }
    }

    /// Bind `locals` on top of the current bindings.
    pub fn bind(&mut self, locals: Locals) -> SavedFrame {
        let mut prior = Vec::with_capacity(locals.len());
        for (name, value) in locals {
            self.register_accessor(&name);
            let previous = self.locals.insert(name.clone(), value);
            prior.push((name, previous));
        }
        self.saved.push(SavedState { prior });
        SavedFrame {
            depth: self.saved.len() - 1,
        }
    }

    /// Undo the bind that produced `frame`.
    ///
    /// Frames bound above it and never restored are unwound first.
    pub fn restore(&mut self, frame: SavedFrame) {
        if frame.depth >= self.saved.len() {
            warn!("Restoring a scope frame that is no longer saved (depth {})", frame.depth);
            return;
        }
        if self.saved.len() - frame.depth > 1 {
            warn!(
                "Unwinding {} unrestored scope frame(s)",
                self.saved.len() - frame.depth - 1
            );
        }
        while self.saved.len() > frame.depth {
            if let Some(state) = self.saved.pop() {
                self.apply_saved(state);
            }
        }
    }

    fn apply_saved(&mut self, state: SavedState) {
        for (name, previous) in state.prior.into_iter().rev() {
            match previous {
                Some(value) => {
                    self.locals.insert(name, value);
                }
                None => {
                    self.locals.remove(&name);
                }
            }
        }
    }

    /// Number of binds currently awaiting restore.
    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn locals(&self) -> &Locals {
        &self.locals
    }
}
