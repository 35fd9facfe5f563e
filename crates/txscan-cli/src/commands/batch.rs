//! Batch processing command for multiple statement files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use txscan_core::{DocumentReport, FormatClassifier, ImportSummary, SecurityCatalog};

use super::process::{self, OutputFormat};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Input files or glob patterns
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers (default: from config)
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Stop at the first file that cannot be read
    #[arg(long)]
    fail_fast: bool,

    /// JSON file with known securities
    #[arg(long)]
    securities: Option<PathBuf>,
}

/// Result of processing a single file.
struct ProcessResult {
    path: PathBuf,
    report: Option<DocumentReport>,
    error: Option<String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = super::config::load(config_path)?;
    let continue_on_error = config.batch.continue_on_error && !args.fail_fast;
    let jobs = args.jobs.unwrap_or(config.batch.jobs).max(1);

    let files = expand_inputs(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No matching files found for: {}", args.inputs.join(" "));
    }

    eprintln!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let classifier = process::build_classifier(&config)?;
    let catalog = process::build_catalog(&config, args.securities.as_deref())?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let results = parse_all(files, jobs, continue_on_error, &pb, move |path| {
        process_single_file(path, &classifier, &catalog)
    })
    .await?;

    pb.finish_with_message("Complete");

    if let Some(output_dir) = &args.output_dir {
        for result in &results {
            let Some(report) = &result.report else {
                continue;
            };
            let output_name = result
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("statement");
            let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));

            let filtered = process::filter_report(report.clone(), &config);
            let content = process::format_reports(&[filtered], args.format, &config)?;
            fs::write(&output_path, content)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        eprintln!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let summary = ImportSummary::from_reports(results.iter().filter_map(|r| r.report.as_ref()));
    let unreadable: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} committed, {} discarded, {} failed, {} errors",
        style(summary.committed).green(),
        summary.discarded,
        style(summary.failed).red(),
        style(summary.errors).red()
    );
    if summary.unrecognized > 0 {
        println!(
            "   {} documents not recognized",
            style(summary.unrecognized).yellow()
        );
    }

    if !summary.diagnostics.is_empty() {
        println!();
        println!("{}", style("Diagnostics:").yellow());
        for diagnostic in &summary.diagnostics {
            println!("  - {}", diagnostic);
        }
    }

    if !unreadable.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for result in &unreadable {
            println!(
                "  - {}: {}",
                result.path.display(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Parse files on at most `jobs` blocking workers, returning results in input
/// order. Without `continue_on_error` no further file is dispatched once one
/// fails, and workers still running are aborted.
async fn parse_all<F>(
    files: Vec<PathBuf>,
    jobs: usize,
    continue_on_error: bool,
    pb: &ProgressBar,
    parse: F,
) -> anyhow::Result<Vec<ProcessResult>>
where
    F: Fn(&Path) -> anyhow::Result<DocumentReport> + Send + Sync + 'static,
{
    let parse = Arc::new(parse);
    let jobs = jobs.max(1);
    let mut tasks = JoinSet::new();
    let mut results = Vec::with_capacity(files.len());
    let mut pending = files.into_iter().enumerate();

    loop {
        while tasks.len() < jobs {
            let Some((index, path)) = pending.next() else {
                break;
            };
            let parse = Arc::clone(&parse);
            tasks.spawn_blocking(move || {
                let file_start = Instant::now();
                let result = parse(&path);
                let processing_time_ms = file_start.elapsed().as_millis() as u64;

                let result = match result {
                    Ok(report) => ProcessResult {
                        path,
                        report: Some(report),
                        error: None,
                        processing_time_ms,
                    },
                    Err(e) => ProcessResult {
                        path,
                        report: None,
                        error: Some(e.to_string()),
                        processing_time_ms,
                    },
                };
                (index, result)
            });
        }

        let Some(joined) = tasks.join_next().await else {
            break;
        };
        let (index, result) = joined?;
        if let Some(message) = &result.error {
            if continue_on_error {
                warn!("Failed to process {}: {}", result.path.display(), message);
            } else {
                error!("Failed to process {}: {}", result.path.display(), message);
                tasks.abort_all();
                anyhow::bail!("Processing failed: {}", message);
            }
        }
        results.push((index, result));
        pb.inc(1);
    }

    // Input order, independent of completion order
    results.sort_by_key(|(index, _)| *index);
    Ok(results.into_iter().map(|(_, r)| r).collect())
}

/// Expand every input as a glob pattern, keeping only files.
fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        for entry in glob(input)? {
            match entry {
                Ok(path) if path.is_file() => {
                    if !files.contains(&path) {
                        files.push(path);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {}: {}", e.path().display(), e),
            }
        }
    }
    Ok(files)
}

fn process_single_file(
    path: &Path,
    classifier: &FormatClassifier,
    catalog: &SecurityCatalog,
) -> anyhow::Result<DocumentReport> {
    Ok(classifier.parse_path(path, catalog)?)
}

fn write_summary(path: &Path, results: &[ProcessResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "formats",
        "committed",
        "discarded",
        "failed",
        "errors",
        "processing_time_ms",
        "error",
    ])?;

    for result in results {
        let filename = result
            .path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("");

        if let Some(report) = &result.report {
            let status = if report.is_recognized() {
                "success"
            } else {
                "unrecognized"
            };
            wtr.write_record([
                filename,
                status,
                &report.formats.join("; "),
                &report.count("committed").to_string(),
                &report.count("discarded").to_string(),
                &report.count("failed").to_string(),
                &report.errors.len().to_string(),
                &result.processing_time_ms.to_string(),
                "",
            ])?;
        } else {
            wtr.write_record([
                filename,
                "error",
                "",
                "",
                "",
                "",
                "",
                &result.processing_time_ms.to_string(),
                result.error.as_deref().unwrap_or(""),
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("statement-{}.txt", i))).collect()
    }

    #[tokio::test]
    async fn test_fail_fast_stops_dispatch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = parse_all(paths(5), 1, false, &ProgressBar::hidden(), move |path| {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("unreadable {}", path.display())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_continue_on_error_keeps_input_order() {
        let results = parse_all(paths(4), 3, true, &ProgressBar::hidden(), |path| {
            if path.ends_with("statement-1.txt") {
                anyhow::bail!("unreadable");
            }
            Ok(DocumentReport::new(path.display().to_string()))
        })
        .await
        .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.path.clone()).collect();
        assert_eq!(names, paths(4));
        assert!(results[1].error.is_some());
        assert_eq!(results.iter().filter(|r| r.report.is_some()).count(), 3);
    }

    #[test]
    fn test_expand_inputs_deduplicates_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        fs::write(dir.path().join("b.txt"), "y").unwrap();
        fs::create_dir(dir.path().join("nested.txt")).unwrap();

        let pattern = dir.path().join("*.txt").display().to_string();
        let explicit = dir.path().join("a.txt").display().to_string();
        let files = expand_inputs(&[pattern, explicit]).unwrap();

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.is_file()));
    }
}
