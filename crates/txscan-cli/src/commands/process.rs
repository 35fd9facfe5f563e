//! Process command - convert a single statement text file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use txscan_core::formats;
use txscan_core::{
    DocumentReport, FormatClassifier, OutputItem, RawDocument, Security, SecurityCatalog,
    TxscanConfig,
};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (statement text, one line per row)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// JSON file with known securities
    #[arg(long)]
    securities: Option<PathBuf>,

    /// Keep discarded items in the output
    #[arg(long)]
    keep_discarded: bool,

    /// Show item counts after conversion
    #[arg(long)]
    summary: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let mut config = super::config::load(config_path)?;
    if args.keep_discarded {
        config.extraction.keep_discarded = true;
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}")?
            .progress_chars("##-"),
    );

    pb.set_message("Loading rule tables...");
    pb.set_position(10);
    let classifier = build_classifier(&config)?;
    let catalog = build_catalog(&config, args.securities.as_deref())?;

    pb.set_message("Reading statement...");
    pb.set_position(30);
    let document = RawDocument::read(&args.input)?;
    debug!("{} has {} lines", document.name(), document.len());

    pb.set_message("Extracting transactions...");
    pb.set_position(60);
    let report = classifier.parse(&document, &catalog);

    pb.finish_and_clear();

    if !report.is_recognized() {
        eprintln!(
            "{} {} was not recognized by any format",
            style("⚠").yellow(),
            document.name()
        );
    }

    let summary = summary_line(&report);
    let report = filter_report(report, &config);
    let output = format_reports(std::slice::from_ref(&report), args.format, &config)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        eprintln!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.summary {
        eprintln!("{} {}", style("ℹ").blue(), summary);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Classifier with every built-in table and the configured defaults.
pub fn build_classifier(config: &TxscanConfig) -> anyhow::Result<FormatClassifier> {
    let classifier = formats::default_classifier()
        .map_err(|e| anyhow::anyhow!("Failed to build rule tables: {}", e))?;
    Ok(classifier.with_config(&config.extraction))
}

/// Security catalog seeded from an optional JSON list of securities.
pub fn build_catalog(
    config: &TxscanConfig,
    securities: Option<&Path>,
) -> anyhow::Result<SecurityCatalog> {
    let mut catalog =
        SecurityCatalog::new().create_missing(config.extraction.create_missing_securities);

    if let Some(path) = securities {
        let content = fs::read_to_string(path)?;
        let known: Vec<Security> = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid security catalog {}: {}", path.display(), e))?;
        debug!("Loaded {} securities from {}", known.len(), path.display());
        for security in known {
            catalog.add(security);
        }
    }

    Ok(catalog)
}

/// Drop discarded and failed items the configuration does not ask for.
pub fn filter_report(mut report: DocumentReport, config: &TxscanConfig) -> DocumentReport {
    report.items.retain(|item| match item {
        OutputItem::Committed { .. } => true,
        OutputItem::Discarded { .. } => config.extraction.keep_discarded,
        OutputItem::Failed { .. } => config.output.include_failed,
    });
    report
}

pub fn summary_line(report: &DocumentReport) -> String {
    format!(
        "{}: {} committed, {} discarded, {} failed, {} errors",
        report.document,
        report.count("committed"),
        report.count("discarded"),
        report.count("failed"),
        report.errors.len()
    )
}

pub fn format_reports(
    reports: &[DocumentReport],
    format: OutputFormat,
    config: &TxscanConfig,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let json = if reports.len() == 1 {
                serde_json::to_value(&reports[0])?
            } else {
                serde_json::to_value(reports)?
            };
            if config.output.pretty {
                Ok(serde_json::to_string_pretty(&json)?)
            } else {
                Ok(serde_json::to_string(&json)?)
            }
        }
        OutputFormat::Csv => format_csv(reports),
        OutputFormat::Text => Ok(format_text(reports)),
    }
}

fn format_csv(reports: &[DocumentReport]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "document",
        "status",
        "kind",
        "date",
        "security",
        "isin",
        "shares",
        "currency",
        "amount",
        "charges",
        "note",
        "diagnostic",
    ])?;

    for report in reports {
        for item in &report.items {
            let diagnostic = match item {
                OutputItem::Committed { .. } => "",
                OutputItem::Discarded { reason } => reason.as_str(),
                OutputItem::Failed { diagnostic, .. } => diagnostic.as_str(),
            };

            let Some(draft) = item.draft() else {
                wtr.write_record([
                    report.document.as_str(),
                    item.status(),
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    diagnostic,
                ])?;
                continue;
            };

            let security = draft.security.as_ref();
            wtr.write_record([
                report.document.as_str(),
                item.status(),
                draft.kind.label(),
                &draft.date.map(|d| d.to_string()).unwrap_or_default(),
                security.map(|s| s.name.as_str()).unwrap_or(""),
                security.and_then(|s| s.isin.as_deref()).unwrap_or(""),
                &draft.shares.map(|s| s.to_string()).unwrap_or_default(),
                draft.currency().map(|c| c.as_str()).unwrap_or(""),
                &draft
                    .settlement()
                    .map(|m| format!("{:.2}", m.as_decimal()))
                    .unwrap_or_default(),
                &draft
                    .charges()
                    .map(|m| format!("{:.2}", m.as_decimal()))
                    .unwrap_or_default(),
                draft.note.as_deref().unwrap_or(""),
                diagnostic,
            ])?;
        }
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

fn format_text(reports: &[DocumentReport]) -> String {
    let mut output = String::new();

    for report in reports {
        output.push_str(&format!("Document: {}\n", report.document));
        if report.formats.is_empty() {
            output.push_str("Format: not recognized\n");
        } else {
            output.push_str(&format!("Format: {}\n", report.formats.join(", ")));
        }
        output.push('\n');

        for item in &report.items {
            match item {
                OutputItem::Discarded { reason } => {
                    output.push_str(&format!("[discarded] {}\n", reason));
                }
                OutputItem::Committed { draft } | OutputItem::Failed { draft, .. } => {
                    output.push_str(&format!("[{}] {}", item.status(), draft.kind.label()));
                    if let Some(date) = draft.date {
                        output.push_str(&format!(" {}", date));
                    }
                    output.push('\n');
                    if let Some(security) = &draft.security {
                        output.push_str(&format!("  Security: {}", security.name));
                        if let Some(isin) = &security.isin {
                            output.push_str(&format!(" ({})", isin));
                        }
                        output.push('\n');
                    }
                    if let Some(shares) = draft.shares {
                        output.push_str(&format!("  Shares:   {}\n", shares));
                    }
                    if let Some(settlement) = draft.settlement() {
                        output.push_str(&format!("  Amount:   {}\n", settlement));
                    }
                    for unit in &draft.units {
                        output.push_str(&format!("  {:?}: {}", unit.kind, unit.amount));
                        if let Some(forex) = &unit.forex {
                            output.push_str(&format!(" ({})", forex));
                        }
                        output.push('\n');
                    }
                    if let Some(note) = &draft.note {
                        output.push_str(&format!("  Note:     {}\n", note));
                    }
                    if let OutputItem::Failed { diagnostic, .. } = item {
                        output.push_str(&format!("  Error:    {}\n", diagnostic));
                    }
                }
            }
        }

        for error in &report.errors {
            output.push_str(&format!(
                "[error] {} lines {}-{}: {}\n",
                error.segment, error.start_line, error.end_line, error.error
            ));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bayer_report() -> DocumentReport {
        let text = "DADAT - Bankhaus\n\
                    Kauf\n\
                    Titel: DE000BAY0017 Bayer AG\n\
                    Namens-Aktien o.N.\n\
                    Zugang: 2 Stk\n\
                    Zu Lasten IBAN AT27 1234 1234 1234 1234 -107,26 EUR\n";
        let document = RawDocument::from_text("bayer.txt", text);
        let config = TxscanConfig::default();
        let classifier = build_classifier(&config).unwrap();
        let catalog = build_catalog(&config, None).unwrap();
        classifier.parse(&document, &catalog)
    }

    #[test]
    fn test_csv_has_one_row_per_item() {
        let report = bayer_report();
        let csv = format_reports(&[report], OutputFormat::Csv, &TxscanConfig::default()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("bayer.txt,committed,buy,"));
        assert!(lines[1].contains("107.26"));
    }

    #[test]
    fn test_filter_drops_discarded_by_default() {
        let mut report = DocumentReport::new("empty.txt");
        report.items.push(OutputItem::Discarded {
            reason: "amount is zero".to_string(),
        });

        let mut config = TxscanConfig::default();
        assert!(filter_report(report.clone(), &config).items.is_empty());

        config.extraction.keep_discarded = true;
        assert_eq!(filter_report(report, &config).items.len(), 1);
    }

    #[test]
    fn test_text_output_names_format() {
        let report = bayer_report();
        let text = format_text(&[report]);
        assert!(text.contains("Format: DADAT"));
        assert!(text.contains("[committed] buy"));
        assert!(text.contains("EUR 107.26"));
    }
}
