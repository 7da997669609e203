//! layout: бинарная раскладка файла: header, слоты вторичных таблиц, префикс записи.
//!
//! Все числа: LE u32. Header:
//!   entry[i] = [table_off u32][table_slots u32], i ∈ 0..256
//! Слот вторичной таблицы:
//!   [hash u32][pos u32], пустой слот = (0, 0); pos=0 лежит внутри header,
//!   поэтому никогда не является началом записи.
//! Запись:
//!   [klen u32][dlen u32][key][data]

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::consts::{BUCKETS, HEADER_ENTRY_SIZE, HEADER_SIZE, REC_HDR_SIZE, SLOT_SIZE};
use crate::error::CdbError;

// -------------------- Header --------------------

/// Указатель header'а на вторичную таблицу бакета.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderEntry {
    pub offset: u32,
    pub slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub entries: [HeaderEntry; BUCKETS],
}

impl Default for Header {
    fn default() -> Self {
        Self {
            entries: [HeaderEntry::default(); BUCKETS],
        }
    }
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        for (i, e) in self.entries.iter().enumerate() {
            let off = i * HEADER_ENTRY_SIZE;
            LittleEndian::write_u32(&mut buf[off..off + 4], e.offset);
            LittleEndian::write_u32(&mut buf[off + 4..off + 8], e.slots);
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CdbError::bad_format(format!(
                "header too short: {} bytes (need {})",
                buf.len(),
                HEADER_SIZE
            ))
            .into());
        }
        let mut h = Header::default();
        for (i, e) in h.entries.iter_mut().enumerate() {
            let off = i * HEADER_ENTRY_SIZE;
            e.offset = LittleEndian::read_u32(&buf[off..off + 4]);
            e.slots = LittleEndian::read_u32(&buf[off + 4..off + 8]);
        }
        Ok(h)
    }

    /// Прочитать header с текущей позиции reader'а (ожидается начало файла).
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                anyhow::Error::new(CdbError::bad_format("file shorter than header"))
            } else {
                anyhow::Error::new(e).context("read header")
            }
        })?;
        Self::decode(&buf)
    }

    /// Конец области записей = минимальное смещение таблиц.
    ///
    /// Таблицы пишутся сразу после последней записи, поэтому первая таблица
    /// (и пустые бакеты перед ней) указывают ровно на конец записей.
    pub fn end_of_records(&self) -> u32 {
        self.entries
            .iter()
            .map(|e| e.offset)
            .min()
            .unwrap_or(HEADER_SIZE as u32)
    }

    /// То же, что end_of_records(), но с проверкой согласованности:
    /// entry[0].offset обязан совпадать с минимумом и быть >= HEADER_SIZE.
    pub fn checked_end_of_records(&self) -> Result<u32> {
        let eod = self.end_of_records();
        let first = self.entries[0].offset;
        if first != eod {
            return Err(CdbError::bad_format(format!(
                "end of records mismatch: entry[0].offset={} min table offset={}",
                first, eod
            ))
            .into());
        }
        if (eod as usize) < HEADER_SIZE {
            return Err(CdbError::bad_format(format!(
                "end of records {} lies inside header",
                eod
            ))
            .into());
        }
        Ok(eod)
    }

    pub fn total_slots(&self) -> u64 {
        self.entries.iter().map(|e| e.slots as u64).sum()
    }

    /// Число записей: каждая таблица вдвое больше своего бакета.
    pub fn record_count(&self) -> u64 {
        self.entries.iter().map(|e| (e.slots / 2) as u64).sum()
    }

    pub fn used_buckets(&self) -> usize {
        self.entries.iter().filter(|e| e.slots > 0).count()
    }
}

// -------------------- Slots --------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    pub hash: u32,
    pub pos: u32,
}

impl Slot {
    pub const EMPTY: Slot = Slot { hash: 0, pos: 0 };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    #[inline]
    pub fn decode(buf: &[u8]) -> Self {
        Slot {
            hash: LittleEndian::read_u32(&buf[0..4]),
            pos: LittleEndian::read_u32(&buf[4..8]),
        }
    }

    #[inline]
    pub fn encode_into(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..4], self.hash);
        LittleEndian::write_u32(&mut buf[4..8], self.pos);
    }
}

/// Записать таблицу слотов подряд, по SLOT_SIZE байт на слот.
pub fn write_slots<W: Write>(w: &mut W, slots: &[Slot]) -> io::Result<()> {
    let mut buf = [0u8; SLOT_SIZE];
    for s in slots {
        s.encode_into(&mut buf);
        w.write_all(&buf)?;
    }
    Ok(())
}

// -------------------- Records --------------------

/// Префикс записи [klen u32][dlen u32].
#[inline]
pub fn write_record_prefix<W: Write>(w: &mut W, klen: u32, dlen: u32) -> io::Result<()> {
    w.write_u32::<LittleEndian>(klen)?;
    w.write_u32::<LittleEndian>(dlen)?;
    Ok(())
}

#[inline]
pub fn read_record_prefix<R: Read>(r: &mut R) -> io::Result<(u32, u32)> {
    let klen = r.read_u32::<LittleEndian>()?;
    let dlen = r.read_u32::<LittleEndian>()?;
    Ok((klen, dlen))
}

#[inline]
pub fn record_len(klen: u32, dlen: u32) -> u64 {
    REC_HDR_SIZE as u64 + klen as u64 + dlen as u64
}

/// Прочитать ровно n байт.
///
/// Буфер растёт по мере чтения (через take), а не выделяется на всю
/// заявленную длину: длина приходит из файла/ввода и может быть мусорной.
pub fn read_exact_vec<R: Read>(r: &mut R, n: u32) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity((n as usize).min(64 * 1024));
    let got = r.take(n as u64).read_to_end(&mut out)?;
    if got != n as usize {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("wanted to read {} bytes, got {}", n, got),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_encode_decode() {
        let mut h = Header::default();
        for (i, e) in h.entries.iter_mut().enumerate() {
            e.offset = 2048 + i as u32 * 16;
            e.slots = (i as u32 % 3) * 2;
        }
        let buf = h.encode();
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(LittleEndian::read_u32(&buf[8..12]), 2048 + 16);
        assert_eq!(LittleEndian::read_u32(&buf[12..16]), 2);
        let back = Header::decode(&buf).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn header_too_short() {
        let err = Header::decode(&[0u8; 100]).unwrap_err();
        assert!(crate::error::is_bad_format(&err));
        let err = Header::read_from(&mut Cursor::new(vec![0u8; 10])).unwrap_err();
        assert!(crate::error::is_bad_format(&err));
    }

    #[test]
    fn end_of_records_checks() {
        let mut h = Header::default();
        for e in h.entries.iter_mut() {
            e.offset = 3000;
        }
        h.entries[5] = HeaderEntry { offset: 3000, slots: 4 };
        h.entries[9].offset = 3032;
        assert_eq!(h.end_of_records(), 3000);
        assert_eq!(h.checked_end_of_records().unwrap(), 3000);
        assert_eq!(h.record_count(), 2);
        assert_eq!(h.used_buckets(), 1);

        // entry[0] расходится с минимумом
        h.entries[0].offset = 3032;
        assert!(h.checked_end_of_records().is_err());

        // конец записей внутри header
        let mut z = Header::default();
        for e in z.entries.iter_mut() {
            e.offset = 100;
        }
        assert!(z.checked_end_of_records().is_err());
    }

    #[test]
    fn slots_layout() {
        let slots = [Slot { hash: 0xAABBCCDD, pos: 2048 }, Slot::EMPTY];
        let mut out = Vec::new();
        write_slots(&mut out, &slots).unwrap();
        assert_eq!(out.len(), 2 * SLOT_SIZE);
        assert_eq!(&out[0..4], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(Slot::decode(&out[0..8]), slots[0]);
        assert!(Slot::decode(&out[8..16]).is_empty());
    }

    #[test]
    fn record_framing() {
        let mut out = Vec::new();
        write_record_prefix(&mut out, 3, 2).unwrap();
        out.extend_from_slice(b"keyv1");
        assert_eq!(out.len() as u64, record_len(3, 2));

        let mut c = Cursor::new(&out);
        assert_eq!(read_record_prefix(&mut c).unwrap(), (3, 2));
        assert_eq!(read_exact_vec(&mut c, 3).unwrap(), b"key");
        assert_eq!(read_exact_vec(&mut c, 2).unwrap(), b"v1");
    }

    #[test]
    fn short_record_fails() {
        let mut out = Vec::new();
        write_record_prefix(&mut out, 3, 100).unwrap();
        out.extend_from_slice(b"keyshort");
        let mut c = Cursor::new(&out);
        let (klen, dlen) = read_record_prefix(&mut c).unwrap();
        assert_eq!(read_exact_vec(&mut c, klen).unwrap(), b"key");
        let err = read_exact_vec(&mut c, dlen).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn huge_declared_length_does_not_preallocate() {
        let mut r = Cursor::new(vec![1u8; 10]);
        let err = read_exact_vec(&mut r, u32::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
