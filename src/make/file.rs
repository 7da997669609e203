//! make/file: сборка в файл с атомарной публикацией.
//!
//! Пишем во временный файл, fsync (если включён), затем rename поверх целевого.
//! При любой ошибке целевой файл не трогаем, временный остаётся на месте
//! для разбора.

use anyhow::{Context, Result};
use log::{info, warn};
use std::fs::{self, OpenOptions};
use std::io::Read;
use std::path::Path;

use super::builder::BuildSummary;
use super::pipeline::make;
use crate::config::CdbConfig;
use crate::util::default_temp_path;

/// Собрать target из текста input. tmp = None -> ".<имя target>" рядом.
pub fn make_file<R: Read>(
    target: &Path,
    tmp: Option<&Path>,
    input: R,
    cfg: &CdbConfig,
) -> Result<BuildSummary> {
    let tmp_path = match tmp {
        Some(p) => p.to_path_buf(),
        None => default_temp_path(target)?,
    };

    let mut f = OpenOptions::new()
        .create(true)
        .truncate(true)
        .read(true)
        .write(true)
        .open(&tmp_path)
        .with_context(|| format!("open temp file {}", tmp_path.display()))?;

    let summary = match make(&mut f, input, cfg) {
        Ok(s) => s,
        Err(e) => {
            warn!(
                "make: build failed, temp file {} left in place: {:#}",
                tmp_path.display(),
                e
            );
            return Err(e);
        }
    };

    if cfg.fsync {
        f.sync_all()
            .with_context(|| format!("fsync {}", tmp_path.display()))?;
    }
    drop(f);

    fs::rename(&tmp_path, target).with_context(|| {
        format!("rename {} -> {}", tmp_path.display(), target.display())
    })?;

    info!(
        "make: {} record(s) written to {} ({} bytes)",
        summary.records,
        target.display(),
        summary.file_len
    );
    Ok(summary)
}
