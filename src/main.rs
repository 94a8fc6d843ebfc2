//! action-trace: inspect trace files written by action scopes

use std::io::{self, Write};
use std::path::PathBuf;

use action_trace::trace::{read_trace_file, TraceRecord};
use action_trace::{util, TraceConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "action-trace")]
#[command(about = "Read back structured action trace files")]
#[command(version)]
struct Cli {
    /// Override the data directory (trace files live in <data-dir>/traces)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the records of a trace file
    Dump {
        /// Path to the trace file
        file: PathBuf,

        /// Only print action lifecycle records
        #[arg(short, long)]
        actions: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = DumpFormat::Jsonl)]
        format: DumpFormat,
    },
    /// List trace files, newest first
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpFormat {
    /// One JSON object per line
    Jsonl,
    /// A pretty-printed JSON array
    Pretty,
    /// `timestamp level message`
    Text,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir);

    match cli.command {
        Commands::Dump {
            file,
            actions,
            format,
        } => run_dump(file, actions, format),
        Commands::List => run_list(),
    }
}

fn run_dump(file: PathBuf, actions_only: bool, format: DumpFormat) -> Result<()> {
    let records: Vec<TraceRecord> = read_trace_file(&file)
        .with_context(|| format!("Failed to read trace file {}", file.display()))?
        .into_iter()
        .filter(|record| !actions_only || record.as_action().is_some())
        .collect();
    tracing::debug!(count = records.len(), path = %file.display(), "Read trace records");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        DumpFormat::Jsonl => {
            for record in &records {
                writeln!(out, "{}", record.to_json_line()?)?;
            }
        }
        DumpFormat::Pretty => {
            writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
        }
        DumpFormat::Text => {
            for record in &records {
                writeln!(
                    out,
                    "{} {:<8} {}",
                    record.timestamp(),
                    record.level(),
                    record.message()
                )?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn run_list() -> Result<()> {
    let config = TraceConfig::load_default().context("Failed to load configuration")?;
    let files = util::list_trace_files(&config.trace_dir).with_context(|| {
        format!(
            "Failed to list trace directory {}",
            config.trace_dir.display()
        )
    })?;
    if files.is_empty() {
        eprintln!("No trace files in {}", config.trace_dir.display());
        return Ok(());
    }
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}
