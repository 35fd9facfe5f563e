//! Formats command - list built-in institutions and document formats.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use console::style;

use txscan_core::{formats, RawDocument};

/// Arguments for the formats command.
#[derive(Args)]
pub struct FormatsArgs {
    #[command(subcommand)]
    command: FormatsCommand,
}

#[derive(Subcommand)]
enum FormatsCommand {
    /// List converters with their formats and segment types
    List,

    /// Show which formats apply to a statement text file
    Detect {
        /// Input file
        input: PathBuf,
    },
}

pub async fn run(args: FormatsArgs) -> anyhow::Result<()> {
    match args.command {
        FormatsCommand::List => list_formats(),
        FormatsCommand::Detect { input } => detect_format(&input),
    }
}

fn list_formats() -> anyhow::Result<()> {
    let converters = formats::converters()
        .map_err(|e| anyhow::anyhow!("Failed to build rule tables: {}", e))?;

    println!("{}", style("Built-in converters:").bold());
    println!();

    for converter in &converters {
        println!("  {}", style(converter.label()).cyan());
        println!(
            "    Identified by: {}",
            converter.bank_identifiers().join(", ")
        );
        for format in converter.formats() {
            println!(
                "    - {} [{}]",
                format.name(),
                format.segment_labels().join(", ")
            );
        }
        println!();
    }

    Ok(())
}

fn detect_format(input: &Path) -> anyhow::Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let classifier = formats::default_classifier()
        .map_err(|e| anyhow::anyhow!("Failed to build rule tables: {}", e))?;
    let content = fs::read_to_string(input)?;
    let document = RawDocument::from_text(input.display().to_string(), content);

    let matches = classifier.classify(&document);
    if matches.is_empty() {
        println!(
            "{} {} is not recognized by any format",
            style("⚠").yellow(),
            input.display()
        );
        return Ok(());
    }

    for (converter, format) in matches {
        println!(
            "{} {} / {}",
            style("✓").green(),
            converter.label(),
            format.name()
        );
    }

    Ok(())
}
