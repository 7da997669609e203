//! reader: чтение готового файла.
//!
//! - RecordIter: последовательный проход по области записей [HEADER_SIZE, eod)
//!   в порядке вставки (основа dump и check).
//! - CdbReader: поиск по ключу через header -> вторичная таблица -> запись.
//!
//! Повреждения формата (таблица за пределами файла, запись, пересекающая eod,
//! обрыв файла): CdbError::BadFormat.

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::consts::{HEADER_SIZE, REC_HDR_SIZE, SLOT_SIZE};
use crate::error::CdbError;
use crate::hash::{bucket_of, cdb_hash, slot_start};
use crate::layout::{read_exact_vec, read_record_prefix, record_len, Header, Slot};
use crate::metrics::record_lookup;
use crate::record::Record;
use crate::util::read_at;

// -------------------- RecordIter --------------------

/// Итератор по записям файла. Ожидает reader, стоящий в начале файла.
pub struct RecordIter<R: Read> {
    r: R,
    header: Header,
    pos: u64,
    eod: u64,
    done: bool,
}

fn truncated(what: &str, pos: u64) -> anyhow::Error {
    CdbError::bad_format(format!("truncated {} at offset {}", what, pos)).into()
}

impl<R: Read> RecordIter<R> {
    pub fn new(mut r: R) -> Result<Self> {
        let header = Header::read_from(&mut r)?;
        let eod = header.checked_end_of_records()? as u64;
        Ok(Self {
            r,
            header,
            pos: HEADER_SIZE as u64,
            eod,
            done: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Смещение следующей записи.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn end_of_records(&self) -> u64 {
        self.eod
    }

    /// Следующая запись вместе с её смещением; Ok(None): дошли до eod.
    pub fn next_with_pos(&mut self) -> Result<Option<(u64, Record)>> {
        if self.done || self.pos == self.eod {
            self.done = true;
            return Ok(None);
        }
        let at = self.pos;
        if at + REC_HDR_SIZE as u64 > self.eod {
            return Err(CdbError::bad_format(format!(
                "record prefix at offset {} crosses end of records {}",
                at, self.eod
            ))
            .into());
        }
        let (klen, dlen) = read_record_prefix(&mut self.r).map_err(|e| map_eof(e, "record prefix", at))?;
        let end = at + record_len(klen, dlen);
        if end > self.eod {
            return Err(CdbError::bad_format(format!(
                "record at offset {} (klen={}, dlen={}) crosses end of records {}",
                at, klen, dlen, self.eod
            ))
            .into());
        }
        let key = read_exact_vec(&mut self.r, klen).map_err(|e| map_eof(e, "record key", at))?;
        let data = read_exact_vec(&mut self.r, dlen).map_err(|e| map_eof(e, "record data", at))?;
        self.pos = end;
        Ok(Some((at, Record { key, data })))
    }
}

fn map_eof(e: io::Error, what: &str, pos: u64) -> anyhow::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        truncated(what, pos)
    } else {
        anyhow::Error::new(e).context(format!("read {} at offset {}", what, pos))
    }
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_with_pos() {
            Ok(Some((_, rec))) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// -------------------- CdbReader --------------------

pub struct CdbReader<R: Read + Seek> {
    r: R,
    header: Header,
    eod: u32,
}

impl CdbReader<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::new(f).with_context(|| format!("read {}", path.display()))
    }
}

impl<R: Read + Seek> CdbReader<R> {
    pub fn new(mut r: R) -> Result<Self> {
        r.seek(SeekFrom::Start(0)).context("seek to header")?;
        let header = Header::read_from(&mut r)?;
        let eod = header.checked_end_of_records()?;
        Ok(Self { r, header, eod })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn end_of_records(&self) -> u32 {
        self.eod
    }

    /// Число записей по header'у.
    pub fn len(&self) -> u64 {
        self.header.record_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> R {
        self.r
    }

    /// Первое значение для key (самая ранняя вставка).
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut found = self.scan_bucket(key, true)?;
        let hit = !found.is_empty();
        record_lookup(hit);
        Ok(found.pop())
    }

    /// Все значения для key в порядке вставки.
    pub fn find(&mut self, key: &[u8]) -> Result<Vec<Vec<u8>>> {
        let found = self.scan_bucket(key, false)?;
        record_lookup(!found.is_empty());
        Ok(found)
    }

    /// Последовательный проход по всем записям с начала файла.
    pub fn records(&mut self) -> Result<RecordIter<BufReader<&mut R>>> {
        self.r.seek(SeekFrom::Start(0)).context("seek to header")?;
        RecordIter::new(BufReader::new(&mut self.r))
    }

    fn read_slot(&mut self, at: u64) -> Result<Slot> {
        let mut buf = [0u8; SLOT_SIZE];
        read_at(&mut self.r, at, &mut buf)?;
        Ok(Slot::decode(&buf))
    }

    /// Прочитать запись по слоту; data: только если ключ совпал.
    fn read_match(&mut self, pos: u32, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if (pos as usize) < HEADER_SIZE || pos >= self.eod {
            return Err(CdbError::bad_format(format!(
                "slot points to {} outside records [{}, {})",
                pos, HEADER_SIZE, self.eod
            ))
            .into());
        }
        let mut prefix = [0u8; REC_HDR_SIZE];
        read_at(&mut self.r, pos as u64, &mut prefix)?;
        let klen = LittleEndian::read_u32(&prefix[0..4]);
        let dlen = LittleEndian::read_u32(&prefix[4..8]);
        if pos as u64 + record_len(klen, dlen) > self.eod as u64 {
            return Err(CdbError::bad_format(format!(
                "record at offset {} crosses end of records {}",
                pos, self.eod
            ))
            .into());
        }
        if klen as usize != key.len() {
            return Ok(None);
        }
        let kpos = pos as u64 + REC_HDR_SIZE as u64;
        let mut stored = vec![0u8; klen as usize];
        read_at(&mut self.r, kpos, &mut stored)?;
        if stored != key {
            return Ok(None);
        }
        let mut data = vec![0u8; dlen as usize];
        read_at(&mut self.r, kpos + klen as u64, &mut data)?;
        Ok(Some(data))
    }

    /// Обход вторичной таблицы бакета от slot_start до первого пустого
    /// слота (или полного круга).
    fn scan_bucket(&mut self, key: &[u8], first_only: bool) -> Result<Vec<Vec<u8>>> {
        let h = cdb_hash(key);
        let entry = self.header.entries[bucket_of(h)];
        let mut out = Vec::new();
        if entry.slots == 0 {
            return Ok(out);
        }
        let start = slot_start(h, entry.slots);
        for i in 0..entry.slots {
            let idx = (start as u64 + i as u64) % entry.slots as u64;
            let slot = self.read_slot(entry.offset as u64 + idx * SLOT_SIZE as u64)?;
            if slot.is_empty() {
                break;
            }
            if slot.hash != h {
                continue;
            }
            if let Some(data) = self.read_match(slot.pos, key)? {
                out.push(data);
                if first_only {
                    break;
                }
            }
        }
        debug!(
            "lookup: bucket {} ({} slots), {} match(es)",
            bucket_of(h),
            entry.slots,
            out.len()
        );
        Ok(out)
    }
}
