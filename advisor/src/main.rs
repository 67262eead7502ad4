//! Command line entry point.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sqlplan_advisor::models::SchemaFacts;
use sqlplan_advisor::{analyze_plan_text, render, AdvisorError, AdvisorResult, AnalysisConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Analyze a ShowPlan XML document for performance problems.
#[derive(Debug, Parser)]
#[command(name = "sqlplan-advisor", version, about)]
struct Cli {
    /// Plan file (.sqlplan / .xml)
    plan: PathBuf,

    /// Report output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Size of the ranked operator lists
    #[arg(long)]
    top: Option<usize>,

    /// Configuration file (defaults to conf/advisor.toml discovery)
    #[arg(long)]
    config: Option<String>,

    /// JSON file with index/statistics facts from the target database
    #[arg(long)]
    schema_facts: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AnalysisConfig::load(cli.config.as_deref())?;
    if let Some(top) = cli.top {
        config.report.top_operators = top;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with_writer(std::io::stderr)
        .init();

    let xml = read_plan_file(&cli.plan)
        .with_context(|| format!("failed to read plan file {}", cli.plan.display()))?;

    // The lookup collaborator is a plain data file; losing it degrades to
    // skipped coverage checks, never to a failed analysis.
    let facts = cli.schema_facts.as_ref().and_then(|path| match load_facts(path) {
        Ok(facts) => Some(facts),
        Err(e) => {
            tracing::warn!("{e}, skipping coverage checks");
            None
        },
    });

    let report = analyze_plan_text(&xml, &config, facts.as_ref())?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.format {
        OutputFormat::Text => render::render_text(&report, &mut out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &report)?;
            writeln!(out)?;
        },
    }

    Ok(())
}

/// Read a plan file, tolerating the UTF-16 encodings SSMS writes.
fn read_plan_file(path: &PathBuf) -> Result<String> {
    let bytes = fs::read(path)?;

    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Ok(decode_utf16(&bytes[2..], u16::from_le_bytes));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Ok(decode_utf16(&bytes[2..], u16::from_be_bytes));
    }

    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

fn decode_utf16(bytes: &[u8], combine: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| combine([c[0], c[1]])).collect();
    char::decode_utf16(units.into_iter())
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

fn load_facts(path: &PathBuf) -> AdvisorResult<SchemaFacts> {
    let content = fs::read_to_string(path)
        .map_err(|e| AdvisorError::lookup_unavailable(format!("{}: {e}", path.display())))?;
    let facts: SchemaFacts = serde_json::from_str(&content)
        .map_err(|e| AdvisorError::lookup_unavailable(format!("{}: {e}", path.display())))?;
    Ok(facts)
}
