//! Template identities, cache keys and flavors.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::RenderConfig;

/// Identity of a template: a resolved storage path, or a sequence number
/// for inline text without a backing file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateIdentity {
    Path(PathBuf),
    Inline(u64),
}

impl fmt::Display for TemplateIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Inline(sequence) => write!(f, "inline #{}", sequence),
        }
    }
}

/// Key of the compiled-unit registry.
///
/// File templates are keyed by path; inline templates by their text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Path(PathBuf),
    Inline(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Inline(text) => {
                let preview: String = text.chars().take(24).collect();
                if preview.len() < text.len() {
                    write!(f, "inline template {:?}...", preview)
                } else {
                    write!(f, "inline template {:?}", preview)
                }
            }
        }
    }
}

/// Which template sub-language applies to a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateFlavor {
    /// Literal text mixed with embedded code tags
    ScriptedMarkup,
    /// Line-oriented markup builder script
    StructuredBuilder,
    /// Externally registered handler, by extension
    Delegate(String),
}

impl TemplateFlavor {
    /// File extension this flavor is stored under.
    pub fn extension<'a>(&'a self, config: &'a RenderConfig) -> &'a str {
        match self {
            Self::ScriptedMarkup => &config.scripted_extension,
            Self::StructuredBuilder => &config.builder_extension,
            Self::Delegate(extension) => extension,
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, Self::Delegate(_))
    }
}

impl fmt::Display for TemplateFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScriptedMarkup => write!(f, "scripted-markup"),
            Self::StructuredBuilder => write!(f, "structured-builder"),
            Self::Delegate(extension) => write!(f, "delegate({})", extension),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_extension() {
        let config = RenderConfig::default();
        assert_eq!(TemplateFlavor::ScriptedMarkup.extension(&config), "erb");
        assert_eq!(TemplateFlavor::StructuredBuilder.extension(&config), "builder");
        assert_eq!(TemplateFlavor::Delegate("md".to_string()).extension(&config), "md");
    }

    #[test]
    fn test_inline_key_display_is_truncated() {
        let key = CacheKey::Inline("x".repeat(40));
        let shown = key.to_string();
        assert!(shown.ends_with("..."));
        assert!(shown.len() < 60);
    }
}
