use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use estimate_tables::config::Settings;
use estimate_tables::sync;
use estimate_tables::{Result, TableError};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(level) = &cli.log_level {
        settings.log_level = level.clone();
    }
    init_logging(&settings.log_level)?;

    match cli.command {
        Command::Tables(args) => print_json(&sync::list_tables(&args.input, &settings)?),
        Command::Read(args) => print_json(&sync::read_table(&args.input, &args.table, &settings)?),
        Command::Write(args) => {
            let output = output_or_input(args.output.as_deref(), &args.input);
            let summary =
                sync::write_table(&args.input, output, &args.table, &args.records, &settings)?;
            print_json(&summary)
        }
        Command::Resize(args) => {
            let output = output_or_input(args.output.as_deref(), &args.input);
            let summary = sync::resize_table(&args.input, output, &args.table, args.rows, &settings)?;
            print_json(&summary)
        }
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|err| TableError::Logging(err.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| TableError::Logging(err.to_string()))
}

fn output_or_input<'a>(output: Option<&'a Path>, input: &'a Path) -> &'a Path {
    output.unwrap_or(input)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Inspect and resize the structured tables of an estimation workbook."
)]
struct Cli {
    /// Optional JSON settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. `debug`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every declared table with its address.
    Tables(InputArgs),
    /// Print a table's rows as JSON objects keyed by header.
    Read(TableArgs),
    /// Replace a table's rows with records from a JSON file.
    Write(WriteArgs),
    /// Resize a table's data region to an exact row count.
    Resize(ResizeArgs),
}

#[derive(clap::Args)]
struct InputArgs {
    /// Workbook path.
    #[arg(long)]
    input: PathBuf,
}

#[derive(clap::Args)]
struct TableArgs {
    /// Workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Table name.
    #[arg(long)]
    table: String,
}

#[derive(clap::Args)]
struct WriteArgs {
    /// Workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Table name.
    #[arg(long)]
    table: String,

    /// JSON array of header → value objects, or `{"rows": [...], "formulas": [...]}`.
    #[arg(long)]
    records: PathBuf,

    /// Where to save the result. Defaults to overwriting the input.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ResizeArgs {
    /// Workbook path.
    #[arg(long)]
    input: PathBuf,

    /// Table name.
    #[arg(long)]
    table: String,

    /// Target number of data rows.
    #[arg(long)]
    rows: u32,

    /// Where to save the result. Defaults to overwriting the input.
    #[arg(long)]
    output: Option<PathBuf>,
}
