use anyhow::Result;
use std::path::PathBuf;

use cdbkit::check::{check_file, ensure_ok};

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let report = check_file(&path)?;
    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("Check:");
        println!("  path           = {}", report.path);
        println!("  file_len       = {}", report.file_len);
        println!("  end_of_records = {}", report.end_of_records);
        println!("  records        = {}", report.records);
        println!("  used_buckets   = {}", report.used_buckets);
        println!("  max_bucket     = {}", report.max_bucket);
        println!("  total_slots    = {}", report.total_slots);
        println!("  ok             = {}", report.ok);
        for e in &report.errors {
            println!("  error: {}", e);
        }
        if report.errors_total > report.errors.len() as u64 {
            println!(
                "  ... {} more error(s)",
                report.errors_total - report.errors.len() as u64
            );
        }
    }
    // ненулевой код выхода для скриптов
    ensure_ok(&report)
}
