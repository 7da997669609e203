//! text/dump: вывод записей в текстовом формате обмена.
//!
//! Каждая запись: "+klen,dlen:key->data\n", в конце одиночный "\n".
//! Вывод dump() пригоден как ввод для make().

use anyhow::{Context, Result};
use log::debug;
use std::io::{BufReader, BufWriter, Read, Write};

use crate::config::CdbConfig;
use crate::metrics::record_dumped;
use crate::reader::RecordIter;

pub struct TextWriter<W: Write> {
    w: W,
    records: u64,
}

impl<W: Write> TextWriter<W> {
    pub fn new(w: W) -> Self {
        Self { w, records: 0 }
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn write_record(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        write!(self.w, "+{},{}:", key.len(), data.len())?;
        self.w.write_all(key)?;
        self.w.write_all(b"->")?;
        self.w.write_all(data)?;
        self.w.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Записать терминатор и вернуть writer.
    pub fn finish(mut self) -> Result<W> {
        self.w.write_all(b"\n")?;
        self.w.flush()?;
        Ok(self.w)
    }
}

/// Прочитать готовый файл из r (с начала) и выгрузить его записи текстом в w.
/// Возвращает число выгруженных записей.
pub fn dump<W: Write, R: Read>(w: W, r: R) -> Result<u64> {
    dump_with_config(w, r, &CdbConfig::default())
}

pub fn dump_with_config<W: Write, R: Read>(w: W, r: R, cfg: &CdbConfig) -> Result<u64> {
    let iter = RecordIter::new(BufReader::with_capacity(cfg.read_buffer_bytes, r))?;
    let mut tw = TextWriter::new(BufWriter::with_capacity(cfg.write_buffer_bytes, w));
    for rec in iter {
        let rec = rec?;
        tw.write_record(&rec.key, &rec.data).context("write dump record")?;
        record_dumped();
    }
    let n = tw.records();
    tw.finish().context("finish dump")?;
    debug!("dump: {} record(s)", n);
    Ok(n)
}
