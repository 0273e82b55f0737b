use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use bplan_converter::convert::{convert_all, error_chain, ConvertOptions};

/// Convert BPLAN files into SQLite databases. Each `<file>[.gz]` is written
/// to `<file>.sqlite`, overwriting any previous conversion.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// BPLAN files to convert, optionally gzip compressed
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Datasette metadata file to update
    #[arg(long, default_value = "metadata.json")]
    metadata: PathBuf,

    /// Do not write the metadata file
    #[arg(long)]
    no_metadata: bool,

    /// SpatiaLite module to load, adds a geometry column to locations
    #[arg(long)]
    spatialite: Option<PathBuf>,

    /// Print row counts of every converted file
    #[arg(long)]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let options = ConvertOptions {
        spatialite: args.spatialite,
        metadata: if args.no_metadata {
            None
        } else {
            Some(args.metadata)
        },
    };

    match convert_all(&args.inputs, &options) {
        Ok((summaries, failures)) => {
            if args.stats {
                for summary in &summaries {
                    summary.print_stats();
                }
            }
            if failures > 0 {
                log::error!("{} of {} files failed", failures, args.inputs.len());
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("{}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}
