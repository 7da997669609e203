//! stats: статистика готового файла по header и вторичным таблицам.
//!
//! distances[d]: сколько записей лежит на расстоянии d от своего slot_start
//! (сколько лишних проб нужно, чтобы их найти); последняя ячейка копит все
//! расстояния >= MAX_DISTANCE.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::consts::{SLOT_SIZE, TABLE_LOAD_FACTOR};
use crate::error::CdbError;
use crate::hash::slot_start;
use crate::layout::{Header, Slot};
use crate::util::read_at;

pub const MAX_DISTANCE: usize = 10;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DbStats {
    pub file_len: u64,
    pub end_of_records: u32,
    pub records: u64,
    pub used_buckets: usize,
    pub max_bucket: usize,
    pub total_slots: u64,
    pub distances: Vec<u64>,
}

impl DbStats {
    /// Средняя доля заполнения таблиц (1/TABLE_LOAD_FACTOR для корректного файла).
    pub fn fill_ratio(&self) -> f64 {
        if self.total_slots == 0 {
            0.0
        } else {
            self.records as f64 / self.total_slots as f64
        }
    }
}

pub fn stats_file(path: &Path) -> Result<DbStats> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    stats(&mut f).with_context(|| format!("stats {}", path.display()))
}

pub fn stats<R: Read + Seek>(r: &mut R) -> Result<DbStats> {
    let file_len = r.seek(SeekFrom::End(0)).context("query file length")?;
    r.seek(SeekFrom::Start(0)).context("seek to header")?;
    let header = Header::read_from(r)?;
    let eod = header.checked_end_of_records()?;

    let mut st = DbStats {
        file_len,
        end_of_records: eod,
        records: header.record_count(),
        used_buckets: header.used_buckets(),
        max_bucket: 0,
        total_slots: header.total_slots(),
        distances: vec![0; MAX_DISTANCE + 1],
    };

    for (i, e) in header.entries.iter().enumerate().filter(|(_, e)| e.slots > 0) {
        // размер таблицы берётся из header: сверить с файлом до аллокации
        let end = e.offset as u64 + e.slots as u64 * SLOT_SIZE as u64;
        if (e.offset as u64) < eod as u64 || end > file_len {
            return Err(CdbError::bad_format(format!(
                "bucket {}: table [{}, {}) outside [{}, {})",
                i, e.offset, end, eod, file_len
            ))
            .into());
        }
        st.max_bucket = st.max_bucket.max(e.slots as usize / TABLE_LOAD_FACTOR);
        let n = e.slots as usize;
        let mut raw = vec![0u8; n * SLOT_SIZE];
        read_at(r, e.offset as u64, &mut raw)?;
        for (idx, chunk) in raw.chunks_exact(SLOT_SIZE).enumerate() {
            let slot = Slot::decode(chunk);
            if slot.is_empty() {
                continue;
            }
            let start = slot_start(slot.hash, e.slots) as usize;
            let d = (idx + n - start) % n;
            st.distances[d.min(MAX_DISTANCE)] += 1;
        }
    }
    Ok(st)
}
