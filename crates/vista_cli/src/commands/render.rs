//! Render command - Render a template by logical path.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;
use tracing::info;

use vista_templates::RenderOptions;

use super::{load_assigns, parse_local, TemplateArgs};

#[derive(Args)]
pub struct RenderArgs {
    /// Logical template path, without extension
    pub path: String,

    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Local variable as name=value (value parsed as JSON when possible)
    #[arg(short, long = "local", value_parser = parse_local)]
    pub locals: Vec<(String, Value)>,

    /// JSON file of assigns, visible to templates as @name
    #[arg(long)]
    pub assigns: Option<PathBuf>,

    /// Print response headers set while rendering to stderr
    #[arg(long)]
    pub headers: bool,
}

pub fn execute(args: RenderArgs) -> Result<()> {
    info!("Rendering template: {}", args.path);

    let assigns = load_assigns(args.assigns.as_ref())?;
    let mut view = args.templates.view(assigns)?;

    let options = RenderOptions::path(&args.path).with_locals(args.locals.into_iter().collect());
    let output = view
        .render(options)
        .with_context(|| format!("Failed to render template {}", args.path))?;

    if args.headers {
        for (name, value) in view.headers() {
            eprintln!("{}: {}", name, value);
        }
    }
    print!("{}", output);
    Ok(())
}
