use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use cdbkit::config::CdbConfig;
use cdbkit::make::make_file;

pub fn exec(path: PathBuf, tmp: Option<PathBuf>, input: Option<PathBuf>) -> Result<()> {
    let cfg = CdbConfig::from_env();
    let reader: Box<dyn Read> = match &input {
        Some(p) => Box::new(File::open(p).with_context(|| format!("open input {}", p.display()))?),
        None => Box::new(std::io::stdin().lock()),
    };
    let summary = make_file(&path, tmp.as_deref(), reader, &cfg)?;
    println!(
        "OK: {} record(s), {} bucket(s) used, {} bytes -> {}",
        summary.records,
        summary.used_buckets,
        summary.file_len,
        path.display()
    );
    Ok(())
}
