use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};

use readyrs::config::{AppConfig, SourceKind};
use readyrs::export::{self, ExportFormat};
use readyrs::logging::{init_logging, LogFormat};
use readyrs::models::{MetricFamily, UnifiedTable};
use readyrs::pipeline::{Analysis, Pipeline, ProcessedData};
use readyrs::source::{write_family, JsonDirSource, RecordSource, SyntheticSource};
use readyrs::ReadyRsError;

const MERGED_FILE: &str = "merged.csv";
const DIAGNOSTICS_FILE: &str = "run_diagnostics.json";

/// readyrs - Personal readiness analytics CLI
///
/// Merges daily sleep, activity, readiness and heart-rate records, derives
/// lag and rolling features, flags deviations from personal baselines and
/// forecasts next-day readiness.
#[derive(Parser)]
#[command(name = "readyrs")]
#[command(version)]
#[command(about = "Personal readiness analytics CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log format (pretty, json, compact)
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    /// Also write JSON logs to this file
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write synthetic raw JSON dumps, one file per family
    Generate {
        /// Output directory (default: data.raw_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Days of history
        #[arg(short, long)]
        days: Option<u32>,

        /// Generator seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Last generated day (YYYY-MM-DD, default: today)
        #[arg(short, long)]
        end: Option<NaiveDate>,
    },

    /// Flatten and merge raw records into one daily table
    Process {
        /// Raw JSON directory (default: data.raw_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Generate synthetic records instead of reading dumps
        #[arg(long)]
        synthetic: bool,

        /// Output CSV (default: data.processed_dir/merged.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compute features, baselines, anomalies and the forecast
    Analyze {
        /// Merged table CSV (default: data.processed_dir/merged.csv)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory (default: data.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (json, csv, text)
        #[arg(short = 'f', long, default_value = "json")]
        format: ExportFormat,

        /// Anomaly threshold in standard deviations
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Skip the forecast
        #[arg(long)]
        no_forecast: bool,
    },

    /// Process then analyze in one pass
    Run {
        /// Raw JSON directory (default: data.raw_dir)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Generate synthetic records instead of reading dumps
        #[arg(long)]
        synthetic: bool,

        /// Output directory (default: data.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format (json, csv, text)
        #[arg(short = 'f', long, default_value = "json")]
        format: ExportFormat,

        /// Skip the forecast
        #[arg(long)]
        no_forecast: bool,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        match err.downcast_ref::<ReadyRsError>() {
            Some(e) => {
                match e.severity().to_tracing_level() {
                    tracing::Level::WARN => tracing::warn!(severity = ?e.severity(), "{}", e),
                    _ => tracing::error!(severity = ?e.severity(), "{}", e),
                }
                eprintln!("{} {}", "✗".red().bold(), e.user_message().red());
            }
            None => eprintln!("{} {:#}", "✗".red().bold(), err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(AppConfig::default_config_path);
    let mut config = match &cli.config {
        Some(path) if path.exists() => AppConfig::load_from_file(path)?,
        Some(_) => AppConfig::default(),
        None => AppConfig::load_or_default(),
    };

    let mut log_config = config.logging.clone();
    log_config.level = log_config.level.raised_by(cli.verbose);
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    if let Some(file) = cli.log_file.clone() {
        log_config.file_path = Some(file);
    }
    init_logging(&log_config)?;

    match cli.command {
        Commands::Generate {
            output,
            days,
            seed,
            end,
        } => {
            let dir = output.unwrap_or_else(|| config.data.raw_dir.clone());
            let days = days.unwrap_or(config.source.days);
            let seed = seed.unwrap_or(config.source.seed);
            let end = end.unwrap_or_else(|| config.source.resolved_end_date());
            generate(&dir, days, seed, end)?;
        }

        Commands::Process {
            input,
            synthetic,
            output,
        } => {
            let source = open_source(&config, input, synthetic)?;
            let output = output.unwrap_or_else(|| config.data.processed_dir.join(MERGED_FILE));

            println!("{}", "Processing raw records...".green().bold());
            let mut pipeline = Pipeline::new(config.pipeline.clone());
            let processed = pipeline.process(source.as_ref());
            let processed = finish_stage(pipeline, processed, output.parent())?;

            export::csv::write_table(&processed.table, &output)?;
            print_processed(&processed);
            println!("{} {}", "✓ Merged table written to".green(), output.display());
        }

        Commands::Analyze {
            input,
            output,
            format,
            threshold,
            no_forecast,
        } => {
            let input = input.unwrap_or_else(|| config.data.processed_dir.join(MERGED_FILE));
            let output = output.unwrap_or_else(|| config.data.output_dir.clone());
            if let Some(threshold) = threshold {
                config.pipeline.anomaly.threshold_std = threshold;
            }
            if no_forecast {
                config.pipeline.forecast.enabled = false;
            }

            if !input.exists() {
                bail!(
                    "Merged table not found: {}. Run `readyrs process` first.",
                    input.display()
                );
            }
            let table = export::csv::read_table(&input)?;

            println!("{}", "Analyzing readiness data...".cyan().bold());
            let mut pipeline = Pipeline::new(config.pipeline.clone());
            let analysis = pipeline.analyze(&table);
            let analysis = finish_stage(pipeline, analysis, Some(&output))?;

            write_outputs(&table, &analysis, &output, format)?;
        }

        Commands::Run {
            input,
            synthetic,
            output,
            format,
            no_forecast,
        } => {
            let source = open_source(&config, input, synthetic)?;
            let output = output.unwrap_or_else(|| config.data.output_dir.clone());
            if no_forecast {
                config.pipeline.forecast.enabled = false;
            }

            println!("{}", "Running full pipeline...".cyan().bold());
            let mut pipeline = Pipeline::new(config.pipeline.clone());
            let result = pipeline.run(source.as_ref());
            let (processed, analysis) = finish_stage(pipeline, result, Some(&output))?;

            let merged = config.data.processed_dir.join(MERGED_FILE);
            export::csv::write_table(&processed.table, &merged)?;
            print_processed(&processed);
            write_outputs(&processed.table, &analysis, &output, format)?;
        }

        Commands::Config { list, set, get } => {
            if list {
                let content = toml::to_string_pretty(&config)
                    .context("Failed to serialize configuration")?;
                println!("{}", format!("# {}", config_path.display()).dimmed());
                println!("{}", content);
            } else if let Some(key_value) = set {
                let Some((key, value)) = key_value.split_once('=') else {
                    bail!("Expected key=value, got {}", key_value);
                };
                config.set_value(key.trim(), value.trim())?;
                match &cli.config {
                    Some(path) => config.save_to_file(path)?,
                    None => config.save_default()?,
                }
                println!("{} {} = {}", "✓ Set".green(), key.trim(), value.trim());
            } else if let Some(key) = get {
                println!("{}", config.get_value(&key)?);
            } else {
                println!("Use --list, --get <key> or --set <key=value>");
            }
        }
    }

    Ok(())
}

fn generate(dir: &Path, days: u32, seed: u64, end: NaiveDate) -> Result<()> {
    println!("{}", "Generating synthetic records...".green().bold());
    println!("  Days: {}  Seed: {}  Ending: {}", days, seed, end);

    let source = SyntheticSource::ending_on(end, days, seed)?;
    for family in MetricFamily::ALL {
        let records = source.fetch(family)?;
        let path = write_family(dir, family, &records)?;
        println!("  {:<10} {:>5} records → {}", family, records.len(), path.display());
    }
    println!("{}", "✓ Synthetic data generated".green());
    Ok(())
}

fn open_source(
    config: &AppConfig,
    input: Option<PathBuf>,
    synthetic: bool,
) -> Result<Box<dyn RecordSource>> {
    if synthetic || (input.is_none() && config.source.kind == SourceKind::Synthetic) {
        let source = SyntheticSource::ending_on(
            config.source.resolved_end_date(),
            config.source.days,
            config.source.seed,
        )?;
        return Ok(Box::new(source));
    }
    let dir = input.unwrap_or_else(|| config.data.raw_dir.clone());
    Ok(Box::new(JsonDirSource::new(dir)?))
}

/// Save diagnostics next to the outputs and pass the stage result through
fn finish_stage<T>(
    pipeline: Pipeline,
    result: readyrs::Result<T>,
    diagnostics_dir: Option<&Path>,
) -> Result<T> {
    let diagnostics = pipeline.into_diagnostics(result.is_ok());
    for warning in &diagnostics.warnings {
        println!("  {} {}", "!".yellow(), warning.yellow());
    }
    match diagnostics_dir.filter(|d| !d.as_os_str().is_empty()) {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            diagnostics.save_to_file(&dir.join(DIAGNOSTICS_FILE))?;
        }
        None => {
            diagnostics.save_default()?;
        }
    }
    Ok(result?)
}

fn print_processed(processed: &ProcessedData) {
    let table: &UnifiedTable = &processed.table;
    match table.date_range() {
        Some((start, end)) => println!(
            "  {} days ({} to {}), {} columns",
            table.len(),
            start,
            end,
            table.columns.len()
        ),
        None => println!("  {}", "No records found".yellow()),
    }
    for (family, count) in &processed.records {
        let rejected = processed.rejected.get(family).copied().unwrap_or(0);
        if rejected > 0 {
            println!("  {:<10} {:>5} records, {} rejected", family, count, rejected.to_string().yellow());
        } else {
            println!("  {:<10} {:>5} records", family, count);
        }
    }
}

fn write_outputs(
    table: &UnifiedTable,
    analysis: &Analysis,
    output: &Path,
    format: ExportFormat,
) -> Result<()> {
    let report = &analysis.report;

    println!("\n{}", "Personal baselines".bold());
    // contributor columns stay in the written report
    let filter = report
        .baselines
        .keys()
        .any(|k| k.ends_with("_score"))
        .then_some("_score");
    println!("{}", export::text::render_baselines(&report.baselines, filter));

    println!(
        "\n{} ({} across {} days)",
        "Anomalies".bold(),
        report.anomalies.len(),
        table.len()
    );
    println!("{}", export::text::render_anomalies(&report.anomalies));

    if let Some(forecast) = &report.forecast {
        println!("\n{}", "Next-day forecast".bold());
        println!("{}", export::text::render_forecast(forecast, 5));
    }

    let written = export::write_analysis(output, analysis, format)?;
    for path in &written {
        println!("  {} {}", "→".dimmed(), path.display());
    }
    println!("{}", "✓ Analysis completed".cyan());
    Ok(())
}
