//! Check command - Compile a scripted template without rendering it.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use super::TemplateArgs;

#[derive(Args)]
pub struct CheckArgs {
    /// Logical template path, without extension
    pub path: String,

    #[command(flatten)]
    pub templates: TemplateArgs,

    /// Only report success, without the generated source
    #[arg(long)]
    pub brief: bool,
}

pub fn execute(args: CheckArgs) -> Result<()> {
    info!("Checking template: {}", args.path);

    let view = args.templates.view(Default::default())?;
    let unit = view
        .compile(&args.path)
        .with_context(|| format!("Failed to compile template {}", args.path))?;

    println!("✅ {} compiles as {}", unit.key(), unit.name());
    if !args.brief {
        println!();
        print!("{}", unit.generated_source());
    }
    Ok(())
}
