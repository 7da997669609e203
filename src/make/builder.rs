//! make/builder: потоковый builder файла.
//!
//! Порядок работы:
//! 1) seek за header (HEADER_SIZE байт остаются зарезервированными);
//! 2) add(): префикс + key + data пишутся сразу, слот (hash, pos) копится в памяти
//!    в списке своего бакета;
//! 3) finish(): flush + сверка позиции файла с отслеживаемой, затем 256 вторичных
//!    таблиц (одна переиспользуемая scratch-таблица на 2 × max бакет), затем
//!    единственный seek(0) и запись header.
//!
//! Любая ошибка прерывает сборку; частично записанный файл невалиден,
//! удалять/игнорировать его: забота вызывающего.

use anyhow::{Context, Result};
use log::debug;
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::consts::{BUCKETS, HEADER_SIZE, SLOT_SIZE, TABLE_LOAD_FACTOR};
use crate::config::CdbConfig;
use crate::error::CdbError;
use crate::hash::{bucket_of, slot_start, CdbHasher};
use crate::layout::{record_len, write_record_prefix, write_slots, Header, HeaderEntry, Slot};
use crate::metrics::{record_added, record_build_completed, record_table_written};
use crate::record::Record;

/// Итог успешной сборки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct BuildSummary {
    pub records: u64,
    /// Конец записей = начало первой вторичной таблицы.
    pub end_of_records: u32,
    /// Полный размер файла.
    pub file_len: u64,
    pub used_buckets: usize,
    pub max_bucket: usize,
}

pub struct CdbBuilder<W: Write + Seek> {
    out: BufWriter<W>,
    hasher: CdbHasher,
    buckets: Vec<Vec<Slot>>,
    pos: u32,
    records: u64,
}

impl<W: Write + Seek> CdbBuilder<W> {
    pub fn new(w: W) -> Result<Self> {
        Self::with_config(w, &CdbConfig::default())
    }

    pub fn with_config(mut w: W, cfg: &CdbConfig) -> Result<Self> {
        w.seek(SeekFrom::Start(HEADER_SIZE as u64))
            .with_context(|| format!("seek past header to {}", HEADER_SIZE))?;
        Ok(Self {
            out: BufWriter::with_capacity(cfg.write_buffer_bytes, w),
            hasher: CdbHasher::new(),
            buckets: vec![Vec::new(); BUCKETS],
            pos: HEADER_SIZE as u32,
            records: 0,
        })
    }

    /// Текущая позиция записи (где начнётся следующая запись).
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    #[inline]
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn add_record(&mut self, rec: &Record) -> Result<()> {
        self.add(&rec.key, &rec.data)
    }

    /// Дописать запись и запомнить её слот.
    pub fn add(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        let klen = u32::try_from(key.len()).map_err(|_| CdbError::TooLarge {
            what: "key",
            end: key.len() as u64,
        })?;
        let dlen = u32::try_from(data.len()).map_err(|_| CdbError::TooLarge {
            what: "data",
            end: data.len() as u64,
        })?;
        let len = record_len(klen, dlen);
        let end = self.pos as u64 + len;
        if end > u32::MAX as u64 {
            return Err(CdbError::TooLarge { what: "record", end }.into());
        }

        write_record_prefix(&mut self.out, klen, dlen).context("write record prefix")?;
        self.hasher.reset();
        self.hasher.update(key);
        self.out.write_all(key).context("write record key")?;
        self.out.write_all(data).context("write record data")?;

        let h = self.hasher.sum32();
        self.buckets[bucket_of(h)].push(Slot { hash: h, pos: self.pos });
        self.pos = end as u32;
        self.records += 1;
        record_added(len);
        Ok(())
    }

    /// Дописать вторичные таблицы и header. Возвращает исходный writer.
    pub fn finish(mut self) -> Result<(W, BuildSummary)> {
        self.out.flush().context("flush records")?;
        let actual = self
            .out
            .get_mut()
            .stream_position()
            .context("query output position")?;
        if actual != self.pos as u64 {
            return Err(CdbError::Inconsistent {
                tracked: self.pos as u64,
                actual,
            }
            .into());
        }

        let end_of_records = self.pos;
        let max_bucket = self.buckets.iter().map(Vec::len).max().unwrap_or(0);
        debug!(
            "builder: {} record(s), records end at {}, max bucket {}",
            self.records, end_of_records, max_bucket
        );

        // Одна scratch-таблица на все бакеты.
        let mut scratch = vec![Slot::EMPTY; max_bucket * TABLE_LOAD_FACTOR];
        let mut header = Header::default();
        let mut pos = self.pos as u64;
        let mut used_buckets = 0usize;

        for (i, bucket) in self.buckets.iter_mut().enumerate() {
            let slots = std::mem::take(bucket);
            if slots.is_empty() {
                header.entries[i] = HeaderEntry {
                    offset: pos as u32,
                    slots: 0,
                };
                continue;
            }

            let nslots = slots.len() * TABLE_LOAD_FACTOR;
            let end = pos + (nslots * SLOT_SIZE) as u64;
            if end > u32::MAX as u64 {
                return Err(CdbError::TooLarge {
                    what: "hash table",
                    end,
                }
                .into());
            }

            let table = &mut scratch[..nslots];
            place_slots(table, &slots);
            write_slots(&mut self.out, table)
                .with_context(|| format!("write table for bucket {}", i))?;

            header.entries[i] = HeaderEntry {
                offset: pos as u32,
                slots: nslots as u32,
            };
            pos = end;
            used_buckets += 1;
            record_table_written(nslots as u64);
        }

        self.out.flush().context("flush tables")?;
        let mut w = self
            .out
            .into_inner()
            .map_err(|e| e.into_error())
            .context("release output")?;

        w.seek(SeekFrom::Start(0)).context("seek to header")?;
        w.write_all(&header.encode()).context("write header")?;
        w.flush().context("flush header")?;

        record_build_completed();
        debug!(
            "builder: {} table(s) written, file length {}",
            used_buckets, pos
        );

        Ok((
            w,
            BuildSummary {
                records: self.records,
                end_of_records,
                file_len: pos,
                used_buckets,
                max_bucket,
            },
        ))
    }
}

/// Разложить слоты бакета по таблице линейным пробированием.
///
/// Таблица очищается целиком; слоты кладутся в порядке вставки, так что среди
/// коллизий раньше вставленный получает меньший индекс пробы.
/// Ёмкость строго больше числа слотов, свободный слот всегда найдётся.
pub(crate) fn place_slots(table: &mut [Slot], slots: &[Slot]) {
    debug_assert!(table.len() > slots.len());
    table.fill(Slot::EMPTY);
    let n = table.len() as u32;
    for s in slots {
        let mut idx = slot_start(s.hash, n);
        while !table[idx as usize].is_empty() {
            idx += 1;
            if idx == n {
                idx = 0;
            }
        }
        table[idx as usize] = *s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, LittleEndian};
    use std::io::Cursor;

    use crate::hash::cdb_hash;

    fn build(records: &[(&str, &str)]) -> (Vec<u8>, BuildSummary) {
        let mut b = CdbBuilder::new(Cursor::new(Vec::new())).unwrap();
        for (k, v) in records {
            b.add(k.as_bytes(), v.as_bytes()).unwrap();
        }
        let (cur, summary) = b.finish().unwrap();
        (cur.into_inner(), summary)
    }

    #[test]
    fn empty_database_is_header_only() {
        let (bytes, summary) = build(&[]);
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(summary.records, 0);
        assert_eq!(summary.file_len, HEADER_SIZE as u64);
        let h = Header::decode(&bytes).unwrap();
        for e in h.entries.iter() {
            assert_eq!(*e, HeaderEntry { offset: 2048, slots: 0 });
        }
    }

    #[test]
    fn single_record_layout() {
        let (bytes, summary) = build(&[("foo", "bar")]);
        // header + record(8+3+3) + table(2 слота × 8)
        assert_eq!(bytes.len(), 2048 + 14 + 16);
        assert_eq!(summary.end_of_records, 2048 + 14);

        assert_eq!(LittleEndian::read_u32(&bytes[2048..2052]), 3);
        assert_eq!(LittleEndian::read_u32(&bytes[2052..2056]), 3);
        assert_eq!(&bytes[2056..2062], b"foobar");

        let h = cdb_hash(b"foo");
        let hdr = Header::decode(&bytes).unwrap();
        let e = hdr.entries[bucket_of(h)];
        assert_eq!(e, HeaderEntry { offset: 2062, slots: 2 });

        let idx = slot_start(h, 2) as usize;
        let off = 2062 + idx * SLOT_SIZE;
        let slot = Slot::decode(&bytes[off..off + 8]);
        assert_eq!(slot, Slot { hash: h, pos: 2048 });
        let other = 2062 + (1 - idx) * SLOT_SIZE;
        assert!(Slot::decode(&bytes[other..other + 8]).is_empty());

        // пустые бакеты до таблицы указывают на конец записей, после: на конец таблицы
        for (i, e) in hdr.entries.iter().enumerate() {
            if i < bucket_of(h) {
                assert_eq!(e.offset, 2062);
            } else if i > bucket_of(h) {
                assert_eq!(e.offset, 2078);
            }
        }
    }

    #[test]
    fn duplicates_are_kept_in_insertion_order() {
        let (bytes, summary) = build(&[("k", "1"), ("k", "2")]);
        assert_eq!(summary.records, 2);
        let h = cdb_hash(b"k");
        let hdr = Header::decode(&bytes).unwrap();
        let e = hdr.entries[bucket_of(h)];
        assert_eq!(e.slots, 4);

        let start = slot_start(h, 4) as usize;
        let first = e.offset as usize + start * SLOT_SIZE;
        let second = e.offset as usize + ((start + 1) % 4) * SLOT_SIZE;
        assert_eq!(Slot::decode(&bytes[first..first + 8]).pos, 2048);
        assert_eq!(Slot::decode(&bytes[second..second + 8]).pos, 2048 + 10);
    }

    #[test]
    fn place_slots_wraps_around() {
        let mut table = vec![Slot { hash: 7, pos: 7 }; 4];
        // все три слота стартуют с последнего индекса
        let h = 3u32 * 256;
        let slots = [
            Slot { hash: h, pos: 10 },
            Slot { hash: h, pos: 20 },
            Slot { hash: h, pos: 30 },
        ];
        place_slots(&mut table, &slots);
        assert_eq!(table[3].pos, 10);
        assert_eq!(table[0].pos, 20);
        assert_eq!(table[1].pos, 30);
        assert!(table[2].is_empty());
    }

    #[test]
    fn position_tracks_records() {
        let mut b = CdbBuilder::new(Cursor::new(Vec::new())).unwrap();
        assert_eq!(b.position(), 2048);
        b.add(b"", b"").unwrap();
        assert_eq!(b.position(), 2056);
        b.add(b"ab", b"cde").unwrap();
        assert_eq!(b.position(), 2069);
        assert_eq!(b.records(), 2);
    }

    /// Writer, который "теряет" байты: позиция файла расходится с builder'ом.
    struct Lossy(Cursor<Vec<u8>>);

    impl Write for Lossy {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            // последний байт каждого вызова молча пропадает
            self.0.write_all(&buf[..buf.len() - 1])?;
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for Lossy {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.0.seek(pos)
        }
    }

    #[test]
    fn position_mismatch_is_fatal() {
        let mut b = CdbBuilder::new(Lossy(Cursor::new(Vec::new()))).unwrap();
        b.add(b"key", b"value").unwrap();
        let err = b.finish().err().expect("must fail");
        assert!(matches!(
            err.downcast_ref::<CdbError>(),
            Some(CdbError::Inconsistent { .. })
        ));
    }
}
