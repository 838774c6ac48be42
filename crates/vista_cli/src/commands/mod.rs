//! CLI command definitions.
//!
//! Every subcommand renders or inspects templates below a root directory;
//! the options shared by all of them live in [`TemplateArgs`].

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use vista_templates::{RenderConfig, TemplateStore, View};

pub mod check;
pub mod inline;
pub mod list;
pub mod render;

/// vista - template rendering from the command line
#[derive(Parser)]
#[command(name = "vista")]
#[command(version, about = "vista - compile and render templates")]
#[command(long_about = r#"
vista renders scripted markup (.erb) and builder (.builder) templates
found below a root directory.

COMMANDS:
  render   → Render a template by logical path
  inline   → Render template text given on the command line
  check    → Compile a scripted template and print its generated source
  list     → List templates below the root

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  4 - Template error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a template by logical path
    Render(render::RenderArgs),

    /// Render template text given on the command line
    Inline(inline::InlineArgs),

    /// Compile a scripted template and print its generated source
    Check(check::CheckArgs),

    /// List templates below the root
    List(list::ListArgs),
}

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    /// Template root directory
    #[arg(short, long, env = "VISTA_ROOT", default_value = ".")]
    pub root: PathBuf,

    /// Cache template sources, re-reading only files modified since
    #[arg(long, env = "VISTA_CACHE_TEMPLATES")]
    pub cache: bool,

    /// Trim mode for scripted markup ("-", ">", "<>")
    #[arg(long, env = "VISTA_TRIM_MODE")]
    pub trim_mode: Option<String>,

    /// YAML render configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl TemplateArgs {
    /// Render configuration from the config file and flags.
    pub fn render_config(&self) -> Result<RenderConfig> {
        let mut config = match &self.config {
            Some(path) => RenderConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            None => RenderConfig::default(),
        };
        if self.cache {
            config = config.with_caching(true);
        }
        if let Some(mode) = &self.trim_mode {
            config = config.with_trim_mode(mode.clone());
        }
        config.validate()?;
        Ok(config)
    }

    /// A view over the template root.
    pub fn view(&self, assigns: HashMap<String, Value>) -> Result<View> {
        if !self.root.is_dir() {
            anyhow::bail!("Template root not found: {:?}", self.root);
        }
        let store = Arc::new(TemplateStore::with_file_storage(self.render_config()?));
        Ok(View::with_assigns(store, &self.root, assigns))
    }
}

/// Parse a `name=value` local. The value is read as JSON, falling back to
/// a plain string.
pub fn parse_local(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing local name in {:?}", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Read assigns from a JSON object file.
pub fn load_assigns(path: Option<&PathBuf>) -> Result<HashMap<String, Value>> {
    let Some(path) = path else {
        return Ok(HashMap::new());
    };
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read assigns {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Assigns in {:?} must be a JSON object", path))
}
