//! make/pipeline: двухстадийный конвейер producer -> builder.
//!
//! Ровно один producer (парсер текста или вызывающий код) и ровно один consumer
//! (builder), между ними ограниченный sync_channel:
//! - send() блокируется, когда канал полон (backpressure);
//! - recv() блокируется, когда канал пуст;
//! - итог сборки возвращается один раз: результатом потока builder'а.
//!
//! Конец потока: явное сообщение Feed::End (пустой ключ: обычная запись).
//! Канал, закрытый без Feed::End, прерывает сборку с CdbError::Aborted.
//! Файл вывода принадлежит только consumer'у.

use anyhow::{anyhow, Result};
use log::debug;
use std::io::{BufReader, Read, Seek, Write};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;

use super::builder::{BuildSummary, CdbBuilder};
use crate::config::CdbConfig;
use crate::error::CdbError;
use crate::metrics::record_build_failed;
use crate::record::Record;
use crate::text::TextReader;

/// Сообщение в канале builder'а.
#[derive(Debug)]
pub enum Feed {
    Record(Record),
    End,
}

/// Consumer: читать записи из канала до Feed::End и собрать файл.
pub fn run_builder<W: Write + Seek>(
    w: W,
    rx: Receiver<Feed>,
    cfg: &CdbConfig,
) -> Result<(W, BuildSummary)> {
    let res = build_from_channel(w, &rx, cfg);
    if let Err(e) = &res {
        record_build_failed();
        debug!("builder: aborted: {:#}", e);
    }
    res
}

fn build_from_channel<W: Write + Seek>(
    w: W,
    rx: &Receiver<Feed>,
    cfg: &CdbConfig,
) -> Result<(W, BuildSummary)> {
    let mut b = CdbBuilder::with_config(w, cfg)?;
    loop {
        match rx.recv() {
            Ok(Feed::Record(rec)) => b.add_record(&rec)?,
            Ok(Feed::End) => break,
            Err(_) => return Err(CdbError::Aborted.into()),
        }
    }
    b.finish()
}

/// Прямая однопоточная сборка из итератора записей.
pub fn make_from_records<W, I>(w: W, records: I, cfg: &CdbConfig) -> Result<(W, BuildSummary)>
where
    W: Write + Seek,
    I: IntoIterator<Item = Record>,
{
    let mut b = CdbBuilder::with_config(w, cfg)?;
    for rec in records {
        b.add_record(&rec)?;
    }
    b.finish()
}

/// Сколько записей producer успел отдать. Если consumer уже остановился
/// (канал закрыт), producer выходит досрочно: причину сообщит consumer.
fn produce<R: Read>(reader: &mut TextReader<BufReader<R>>, tx: &SyncSender<Feed>) -> Result<u64> {
    let mut sent = 0u64;
    loop {
        match reader.next_record()? {
            Some(rec) => {
                if tx.send(Feed::Record(rec)).is_err() {
                    return Ok(sent);
                }
                sent += 1;
            }
            None => {
                let _ = tx.send(Feed::End);
                return Ok(sent);
            }
        }
    }
}

/// Собрать файл из текстового формата: r: текст, w: seekable вывод.
///
/// Парсинг идёт в текущем потоке, builder: в scoped-потоке.
/// Ошибка разбора закрывает канал (builder прерывается) и возвращается вызывающему;
/// иначе возвращается результат builder'а.
pub fn make<W, R>(w: &mut W, r: R, cfg: &CdbConfig) -> Result<BuildSummary>
where
    W: Write + Seek + Send,
    R: Read,
{
    let mut reader = TextReader::new(BufReader::with_capacity(cfg.read_buffer_bytes, r));
    let (tx, rx) = sync_channel::<Feed>(cfg.channel_depth.max(1));

    thread::scope(|s| -> Result<BuildSummary> {
        let consumer = thread::Builder::new()
            .name("cdb-builder".to_string())
            .spawn_scoped(s, move || run_builder(w, rx, cfg))
            .map_err(|e| anyhow!("spawn builder thread: {}", e))?;

        let produced = produce(&mut reader, &tx);
        drop(tx);

        let built = consumer
            .join()
            .map_err(|_| anyhow!("builder thread panicked"))?;

        let sent = produced?;
        let (_, summary) = built?;
        debug!("make: {} record(s) streamed to builder", sent);
        Ok(summary)
    })
}
