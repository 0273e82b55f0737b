use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use bplan_converter::convert::error_chain;
use bplan_converter::db::inspect::DatabaseStats;

/// Print the header, table sizes and extent of converted BPLAN databases.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Databases written by bplanfile-converter
    #[arg(required = true)]
    databases: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut status = ExitCode::SUCCESS;
    for path in &args.databases {
        if !path.is_file() {
            log::error!("{} is not a file", path.display());
            status = ExitCode::FAILURE;
            continue;
        }

        println!("Reading {}", path.display());
        match DatabaseStats::load(path) {
            Ok(stats) => stats.print_stats(),
            Err(e) => {
                log::error!("Unable to read {}: {}", path.display(), error_chain(&e));
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
