use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use cdbkit::config::CdbConfig;
use cdbkit::text::dump_with_config;

pub fn exec(path: PathBuf, out: Option<PathBuf>) -> Result<()> {
    let cfg = CdbConfig::from_env();
    let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let n = match out {
        Some(out_path) => {
            let w = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&out_path)
                .with_context(|| format!("open output {}", out_path.display()))?;
            dump_with_config(w, f, &cfg)?
        }
        None => dump_with_config(std::io::stdout().lock(), f, &cfg)?,
    };
    log::info!("dump: {} record(s) from {}", n, path.display());
    Ok(())
}
