//! Shapes a render call can take.

use serde_json::Value;

use crate::scope::Locals;

/// Options for [`crate::View::render`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOptions {
    /// Logical template path, flavor resolved by the dispatcher
    Path(String),
    /// Template file, optionally given as a full path with extension
    File {
        path: String,
        use_full_path: bool,
        locals: Locals,
    },
    /// Template text without a backing file
    Inline {
        text: String,
        flavor: Option<String>,
        locals: Locals,
    },
    /// Partial rendered for one object
    Partial {
        name: String,
        object: Option<Value>,
        locals: Locals,
    },
    /// Partial rendered once per collection element
    PartialCollection {
        name: String,
        collection: Vec<Value>,
        spacer: Option<String>,
        locals: Locals,
    },
}

impl RenderOptions {
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            use_full_path: true,
            locals: Locals::new(),
        }
    }

    pub fn inline(text: impl Into<String>) -> Self {
        Self::Inline {
            text: text.into(),
            flavor: None,
            locals: Locals::new(),
        }
    }

    pub fn partial(name: impl Into<String>) -> Self {
        Self::Partial {
            name: name.into(),
            object: None,
            locals: Locals::new(),
        }
    }

    pub fn collection(name: impl Into<String>, collection: Vec<Value>) -> Self {
        Self::PartialCollection {
            name: name.into(),
            collection,
            spacer: None,
            locals: Locals::new(),
        }
    }

    /// Add a local. A plain path becomes a file render carrying it.
    pub fn with_local(mut self, name: impl Into<String>, value: Value) -> Self {
        if let Self::Path(path) = self {
            self = Self::File {
                path,
                use_full_path: true,
                locals: Locals::new(),
            };
        }
        if let Some(locals) = self.locals_mut() {
            locals.insert(name.into(), value);
        }
        self
    }

    pub fn with_locals(mut self, extra: Locals) -> Self {
        for (name, value) in extra {
            self = self.with_local(name, value);
        }
        self
    }

    /// Treat a file path as complete, extension included.
    pub fn use_full_path(mut self, full: bool) -> Self {
        if let Self::File { use_full_path, .. } = &mut self {
            *use_full_path = full;
        }
        self
    }

    /// Flavor extension of inline text.
    pub fn flavor(mut self, extension: impl Into<String>) -> Self {
        if let Self::Inline { flavor, .. } = &mut self {
            *flavor = Some(extension.into());
        }
        self
    }

    pub fn object(mut self, value: Value) -> Self {
        if let Self::Partial { object, .. } = &mut self {
            *object = Some(value);
        }
        self
    }

    /// Partial rendered between consecutive collection elements.
    pub fn spacer(mut self, name: impl Into<String>) -> Self {
        if let Self::PartialCollection { spacer, .. } = &mut self {
            *spacer = Some(name.into());
        }
        self
    }

    fn locals_mut(&mut self) -> Option<&mut Locals> {
        match self {
            Self::Path(_) => None,
            Self::File { locals, .. }
            | Self::Inline { locals, .. }
            | Self::Partial { locals, .. }
            | Self::PartialCollection { locals, .. } => Some(locals),
        }
    }
}
