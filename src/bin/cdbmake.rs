//! cdbmake f [ftmp]: собрать f из текста на stdin через временный ftmp.
//!
//! Ошибка использования: код 2 (clap), ошибка сборки: код 1.

use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use std::path::PathBuf;

use cdbkit::config::CdbConfig;
use cdbkit::make::make_file;

#[derive(Parser, Debug)]
#[command(name = "cdbmake", version, about = "Build a constant database from stdin")]
struct Args {
    /// Target database file
    f: PathBuf,
    /// Temp file (default: .<name> next to f)
    ftmp: Option<PathBuf>,
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = CdbConfig::from_env();
    let stdin = std::io::stdin();
    make_file(&args.f, args.ftmp.as_deref(), stdin.lock(), &cfg)?;
    Ok(())
}
