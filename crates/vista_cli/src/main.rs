//! vista CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 4: Template error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vista_templates::TemplateError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const TEMPLATE_ERROR: u8 = 4;
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "vista=debug"
    } else if cli.quiet {
        "vista=warn"
    } else {
        "vista=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // Logging may already be initialized by an embedding process
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = match cli.command {
        Commands::Render(args) => commands::render::execute(args),
        Commands::Inline(args) => commands::inline::execute(args),
        Commands::Check(args) => commands::check::execute(args),
        Commands::List(args) => commands::list::execute(args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            report_template_failure(&e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn template_error(e: &anyhow::Error) -> Option<&TemplateError> {
    e.chain().find_map(|cause| cause.downcast_ref::<TemplateError>())
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    match template_error(e) {
        Some(TemplateError::Config(_)) => ExitCodes::INVALID_ARGS,
        Some(_) => ExitCodes::TEMPLATE_ERROR,
        None if e.to_string().to_lowercase().contains("argument") => ExitCodes::INVALID_ARGS,
        None => ExitCodes::GENERAL_ERROR,
    }
}

/// Print the include trace and source extract of a template failure.
fn report_template_failure(e: &anyhow::Error) {
    let Some(failure) = template_error(e).and_then(TemplateError::as_failure) else {
        return;
    };

    if failure.chain().len() > 1 {
        eprintln!("\nIncluded via:");
        for (depth, file) in failure.trace().enumerate() {
            eprintln!("  {}{}", "  ".repeat(depth), file);
        }
    }

    let extract = failure.source_extract(2);
    if !extract.is_empty() {
        eprintln!("\n{}", extract.trim_end());
    }

    if let TemplateError::Compile { generated_source, .. } = failure.original_cause() {
        eprintln!("\nGenerated source:\n{}", generated_source.trim_end());
    }
}
