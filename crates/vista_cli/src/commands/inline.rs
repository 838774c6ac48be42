//! Inline command - Render template text given on the command line.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

use vista_templates::RenderOptions;

use super::{parse_local, TemplateArgs};

#[derive(Args)]
pub struct InlineArgs {
    /// Template text
    pub text: String,

    /// Flavor extension of the text (defaults to scripted markup)
    #[arg(short, long)]
    pub flavor: Option<String>,

    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Local variable as name=value (value parsed as JSON when possible)
    #[arg(short, long = "local", value_parser = parse_local)]
    pub locals: Vec<(String, Value)>,
}

pub fn execute(args: InlineArgs) -> Result<()> {
    let mut view = args.templates.view(Default::default())?;

    let mut options = RenderOptions::inline(args.text).with_locals(args.locals.into_iter().collect());
    if let Some(flavor) = args.flavor {
        options = options.flavor(flavor);
    }
    let output = view.render(options).context("Failed to render inline template")?;

    println!("{}", output);
    Ok(())
}
