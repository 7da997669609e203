//! check: проверка структурной целостности готового файла и отчёт.
//!
//! Проверяется:
//! - header читается, entry[0].offset совпадает с минимальным смещением таблиц;
//! - размеры таблиц чётные, таблицы идут подряд в порядке бакетов от конца
//!   записей до конца файла;
//! - область записей разбирается без обрывов, число записей совпадает с header;
//! - каждый непустой слот лежит в своём бакете, указывает на начало записи
//!   с тем же хешем ключа и достижим линейным обходом от slot_start без пустых слотов;
//! - на каждую запись ссылается ровно один слот.
//!
//! Ошибки структуры собираются в отчёт (не более MAX_REPORTED_ERRORS текстов);
//! Err возвращается только при ошибке ввода-вывода.

use anyhow::{Context, Result};
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::consts::{HEADER_SIZE, SLOT_SIZE, TABLE_LOAD_FACTOR};
use crate::error::{is_bad_format, CdbError};
use crate::hash::{bucket_of, cdb_hash, slot_start};
use crate::layout::{Header, Slot};
use crate::reader::RecordIter;
use crate::util::read_at;

const MAX_REPORTED_ERRORS: usize = 100;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CheckReport {
    pub path: String,
    pub file_len: u64,
    pub end_of_records: u32,
    pub records: u64,
    pub used_buckets: usize,
    pub max_bucket: usize,
    pub total_slots: u64,
    pub ok: bool,
    pub errors: Vec<String>,
    pub errors_total: u64,
}

impl CheckReport {
    fn error(&mut self, msg: String) {
        self.errors_total += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(msg);
        }
    }
}

struct RecordInfo {
    hash: u32,
    refs: u32,
}

pub fn check_file(path: &Path) -> Result<CheckReport> {
    let mut f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let file_len = f
        .metadata()
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let mut report = check(&mut f, file_len)?;
    report.path = path.display().to_string();
    Ok(report)
}

/// Проверить содержимое r длиной file_len байт.
pub fn check<R: Read + Seek>(r: &mut R, file_len: u64) -> Result<CheckReport> {
    let mut report = CheckReport {
        file_len,
        ..Default::default()
    };

    r.seek(SeekFrom::Start(0)).context("seek to header")?;
    let header = match Header::read_from(r) {
        Ok(h) => h,
        Err(e) if is_bad_format(&e) => {
            report.error(format!("{:#}", e));
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let eod = header.end_of_records();
    report.end_of_records = eod;
    report.used_buckets = header.used_buckets();
    report.max_bucket = header
        .entries
        .iter()
        .map(|e| (e.slots as usize) / TABLE_LOAD_FACTOR)
        .max()
        .unwrap_or(0);
    report.total_slots = header.total_slots();

    let tables_ok = check_table_layout(&header, file_len, &mut report);

    // записи: позиция -> (хеш ключа, число ссылок)
    let mut records: HashMap<u64, RecordInfo> = HashMap::new();
    let scanned = scan_records(r, &mut records, &mut report)?;
    report.records = records.len() as u64;

    if scanned && report.records != header.record_count() {
        report.error(format!(
            "record count mismatch: {} record(s) in data area, header tables imply {}",
            report.records,
            header.record_count()
        ));
    }

    if tables_ok {
        check_slots(r, &header, &mut records, &mut report)?;
        if scanned {
            let mut unreferenced: Vec<u64> = Vec::new();
            for (pos, info) in &records {
                if info.refs == 0 {
                    unreferenced.push(*pos);
                } else if info.refs > 1 {
                    report.error(format!(
                        "record at offset {} referenced by {} slots",
                        pos, info.refs
                    ));
                }
            }
            unreferenced.sort_unstable();
            for pos in unreferenced {
                report.error(format!("record at offset {} is not referenced by any slot", pos));
            }
        }
    }

    report.ok = report.errors_total == 0;
    debug!(
        "check: {} record(s), {} error(s)",
        report.records, report.errors_total
    );
    Ok(report)
}

/// Раскладка таблиц: чётность, порядок бакетов, смежность, конец файла.
fn check_table_layout(header: &Header, file_len: u64, report: &mut CheckReport) -> bool {
    let before = report.errors_total;
    let eod = header.end_of_records();
    if header.entries[0].offset != eod {
        report.error(format!(
            "end of records mismatch: entry[0].offset={} min table offset={}",
            header.entries[0].offset, eod
        ));
    }
    if (eod as usize) < HEADER_SIZE {
        report.error(format!("end of records {} lies inside header", eod));
    }

    let mut expected = eod as u64;
    for (i, e) in header.entries.iter().enumerate() {
        if e.slots % 2 != 0 {
            report.error(format!("bucket {}: odd table size {}", i, e.slots));
        }
        if e.offset as u64 != expected {
            report.error(format!(
                "bucket {}: table at offset {}, expected {}",
                i, e.offset, expected
            ));
        }
        expected = e.offset as u64 + e.slots as u64 * SLOT_SIZE as u64;
    }
    if expected != file_len {
        report.error(format!(
            "tables end at {}, file length is {}",
            expected, file_len
        ));
    }
    report.errors_total == before
}

/// Пройти область записей. false: проход прерван ошибкой формата.
fn scan_records<R: Read + Seek>(
    r: &mut R,
    records: &mut HashMap<u64, RecordInfo>,
    report: &mut CheckReport,
) -> Result<bool> {
    r.seek(SeekFrom::Start(0)).context("seek to header")?;
    let mut iter = match RecordIter::new(BufReader::new(&mut *r)) {
        Ok(it) => it,
        // рассинхрон eod уже учтён в check_table_layout
        Err(e) if is_bad_format(&e) => return Ok(false),
        Err(e) => return Err(e),
    };
    loop {
        match iter.next_with_pos() {
            Ok(Some((pos, rec))) => {
                records.insert(
                    pos,
                    RecordInfo {
                        hash: cdb_hash(&rec.key),
                        refs: 0,
                    },
                );
            }
            Ok(None) => return Ok(true),
            Err(e) if is_bad_format(&e) => {
                report.error(format!("{:#}", e));
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
    }
}

fn check_slots<R: Read + Seek>(
    r: &mut R,
    header: &Header,
    records: &mut HashMap<u64, RecordInfo>,
    report: &mut CheckReport,
) -> Result<()> {
    for (i, e) in header.entries.iter().enumerate() {
        if e.slots == 0 {
            continue;
        }
        let n = e.slots as usize;
        let mut raw = vec![0u8; n * SLOT_SIZE];
        match read_at(r, e.offset as u64, &mut raw) {
            Ok(()) => {}
            Err(err) if is_bad_format(&err) => {
                report.error(format!("bucket {}: {:#}", i, err));
                continue;
            }
            Err(err) => return Err(err),
        }
        let table: Vec<Slot> = raw.chunks_exact(SLOT_SIZE).map(Slot::decode).collect();

        let used = table.iter().filter(|s| !s.is_empty()).count();
        if used * TABLE_LOAD_FACTOR != n {
            report.error(format!(
                "bucket {}: {} non-empty slot(s) in a table of {}",
                i, used, n
            ));
        }

        for (idx, slot) in table.iter().enumerate() {
            if slot.is_empty() {
                continue;
            }
            if bucket_of(slot.hash) != i {
                report.error(format!(
                    "bucket {} slot {}: hash {:#010x} belongs to bucket {}",
                    i,
                    idx,
                    slot.hash,
                    bucket_of(slot.hash)
                ));
            }
            match records.get_mut(&(slot.pos as u64)) {
                Some(info) => {
                    info.refs += 1;
                    if info.hash != slot.hash {
                        report.error(format!(
                            "bucket {} slot {}: hash {:#010x} != key hash {:#010x} of record at {}",
                            i, idx, slot.hash, info.hash, slot.pos
                        ));
                    }
                }
                None => report.error(format!(
                    "bucket {} slot {}: position {} is not a record start",
                    i, idx, slot.pos
                )),
            }
            if !reachable(&table, idx, slot.hash) {
                report.error(format!(
                    "bucket {} slot {}: unreachable from slot start {}",
                    i,
                    idx,
                    slot_start(slot.hash, e.slots)
                ));
            }
        }
    }
    Ok(())
}

/// Слот idx достижим, если между slot_start и idx (по кругу) нет пустых слотов.
fn reachable(table: &[Slot], idx: usize, hash: u32) -> bool {
    let n = table.len();
    let mut j = slot_start(hash, n as u32) as usize;
    while j != idx {
        if table[j].is_empty() {
            return false;
        }
        j = (j + 1) % n;
    }
    true
}

/// Короткая проверка для вызывающего кода: Err(BadFormat), если отчёт не ok.
pub fn ensure_ok(report: &CheckReport) -> Result<()> {
    if report.ok {
        return Ok(());
    }
    let first = report.errors.first().cloned().unwrap_or_default();
    Err(CdbError::bad_format(format!(
        "{} structural error(s), first: {}",
        report.errors_total, first
    ))
    .into())
}
