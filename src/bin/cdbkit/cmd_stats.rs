use anyhow::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use cdbkit::stats::{stats_file, DbStats, MAX_DISTANCE};

/// JSON-отчёт: только то, что прочитано из файла. Счётчики metrics тут не
/// выводятся: stats ничего не строит и не ищет, они были бы нулями.
fn json_report(path: &Path, st: &DbStats) -> Value {
    json!({
        "path": path.display().to_string(),
        "stats": st,
        "fill_ratio": st.fill_ratio(),
    })
}

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let st = stats_file(&path)?;

    if json {
        println!("{}", serde_json::to_string(&json_report(&path, &st))?);
        return Ok(());
    }

    println!("Stats:");
    println!("  path           = {}", path.display());
    println!("  file_len       = {}", st.file_len);
    println!("  end_of_records = {}", st.end_of_records);
    println!("  records        = {}", st.records);
    println!("  used_buckets   = {}", st.used_buckets);
    println!("  max_bucket     = {}", st.max_bucket);
    println!("  total_slots    = {}", st.total_slots);
    println!("  fill_ratio     = {:.3}", st.fill_ratio());
    println!("  slot distances:");
    for (d, n) in st.distances.iter().enumerate() {
        if d == MAX_DISTANCE {
            println!("    {:>2}+ : {}", d, n);
        } else {
            println!("    {:>3} : {}", d, n);
        }
    }
    Ok(())
}
