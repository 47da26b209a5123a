use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use neon_envi::{ByteOrder, ConversionConfig, ConversionSummary, FillPolicy};
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Worker threads for parallel steps (default: number of CPU cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Radiance cube from the integer and decimal parts
    Rad(CommonArgs),

    /// Six-band observation geometry from OBS_Data
    Obs {
        #[command(flatten)]
        common: CommonArgs,

        /// Replacement for -9999 pixels: a number, "nan", or "none" to keep them
        #[arg(long, default_value = "nan", value_parser = parse_fill)]
        fill: FillPolicy,
    },

    /// Easting/northing grid from an ENVI header or the HDF5 source
    Loc(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Input HDF5 file (or ENVI .hdr for loc)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output basename; the header is written to <OUTPUT_BASE>.hdr
    #[arg(value_name = "OUTPUT_BASE")]
    output: PathBuf,

    /// Lines read and written per chunk
    #[arg(long, default_value_t = 1)]
    lines_per_chunk: usize,

    /// Byte order of the output cube (little or big)
    #[arg(long, default_value = "little", value_parser = parse_byte_order)]
    byte_order: ByteOrder,

    /// Top-level HDF5 group (default: the first one)
    #[arg(long)]
    site: Option<String>,
}

impl CommonArgs {
    fn to_config(&self, fill_policy: FillPolicy) -> ConversionConfig {
        let mut config = ConversionConfig::new(&self.input, &self.output);
        config.fill_policy = fill_policy;
        config.lines_per_chunk = self.lines_per_chunk;
        config.byte_order = self.byte_order;
        config.site = self.site.clone();
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = cli.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let summary = run(&cli.command)?;

    report(&summary);
    info!("Total processing time: {:?}", start_time.elapsed());

    Ok(())
}

fn run(command: &Command) -> Result<ConversionSummary> {
    let (args, fill_policy) = match command {
        Command::Rad(args) | Command::Loc(args) => (args, FillPolicy::default()),
        Command::Obs { common, fill } => (common, *fill),
    };

    let created = create_output_dirs(&args.output)?;
    let result = convert(command, args.to_config(fill_policy));
    if result.is_err() {
        remove_empty_dirs(&created);
    }
    result
}

fn convert(command: &Command, config: ConversionConfig) -> Result<ConversionSummary> {
    let summary = match command {
        Command::Rad(_) => neon_envi::convert_radiance(&config)
            .with_context(|| format!("Radiance conversion failed: {:?}", config.input_path))?,
        Command::Obs { .. } => neon_envi::convert_observation(&config)
            .with_context(|| format!("Observation conversion failed: {:?}", config.input_path))?,
        Command::Loc(_) => neon_envi::generate_location(&config)
            .with_context(|| format!("Location grid failed: {:?}", config.input_path))?,
    };
    Ok(summary)
}

fn parse_fill(value: &str) -> Result<FillPolicy, String> {
    value.parse().map_err(|e: neon_envi::ConvertError| e.to_string())
}

fn parse_byte_order(value: &str) -> Result<ByteOrder, String> {
    value.parse().map_err(|e: neon_envi::ConvertError| e.to_string())
}

/// Creates the missing parent directories of `output` and returns them,
/// deepest first.
fn create_output_dirs(output: &Path) -> Result<Vec<PathBuf>> {
    let mut missing = Vec::new();
    let mut dir = output.parent();
    while let Some(parent) = dir {
        if parent.as_os_str().is_empty() || parent.exists() {
            break;
        }
        missing.push(parent.to_path_buf());
        dir = parent.parent();
    }

    if let Some(deepest) = missing.first() {
        fs::create_dir_all(deepest)
            .with_context(|| format!("Failed to create output directory {:?}", deepest))?;
    }
    Ok(missing)
}

/// Removes directories from `create_output_dirs` that are still empty.
fn remove_empty_dirs(created: &[PathBuf]) {
    for dir in created {
        if fs::remove_dir(dir).is_err() {
            break;
        }
    }
}

fn report(summary: &ConversionSummary) {
    info!(
        "Written {} to {:?} (header {:?})",
        summary.geometry, summary.data_path, summary.header_path
    );
}
