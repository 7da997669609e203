use anyhow::Result;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use cdbkit::metrics;
use cdbkit::reader::CdbReader;
use cdbkit::util::{display_text, hex_dump};

use super::util::decode_key_arg;

pub fn exec(path: PathBuf, key: String, all: bool, out: Option<PathBuf>) -> Result<()> {
    let k = decode_key_arg(&key)?;
    let mut db = CdbReader::open(&path)?;
    let values = if all {
        db.find(&k)?
    } else {
        db.get(&k)?.into_iter().collect()
    };
    let ms = metrics::snapshot();
    log::debug!(
        "get: {} lookup(s), hit ratio {:.2}",
        ms.lookups_total,
        ms.lookup_hit_ratio()
    );

    let first = match values.first() {
        Some(v) => v,
        None => {
            println!("NOT FOUND '{}'", key);
            return Ok(());
        }
    };

    if let Some(out_path) = out {
        if let Some(parent) = out_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&out_path)?;
        f.write_all(first)?;
        f.sync_all()?;
        println!(
            "FOUND '{}': {} B -> wrote to {}",
            key,
            first.len(),
            out_path.display()
        );
        return Ok(());
    }

    for (i, v) in values.iter().enumerate() {
        if values.len() > 1 {
            println!("FOUND '{}' [{}]: {} B", key, i, v.len());
        } else {
            println!("FOUND '{}': {} B", key, v.len());
        }
        println!("text: {}", display_text(v));
        println!("hex:  {}", hex_dump(&v[..v.len().min(64)]));
    }
    Ok(())
}
