//! writer: потоковый writer-handle для программной сборки.
//!
//! create() открывает временный файл (".<имя>" рядом с целевым, 0640 на unix),
//! берёт на него exclusive-lock (fs2) и запускает поток builder'а.
//! put() отдаёт записи в ограниченный канал, close() шлёт маркер конца,
//! дожидается builder'а и публикует файл через rename.
//!
//! - Ошибка сборки при close(): целевой файл не трогается, временный остаётся.
//! - abort() или Drop без close(): builder прерывается, временный файл удаляется.
//! - Второй writer на тот же временный файл получает ошибку lock'а.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::thread::{self, JoinHandle};

use crate::config::CdbConfig;
use crate::make::{run_builder, BuildSummary, Feed};
use crate::record::Record;
use crate::util::default_temp_path;

type BuildResult = Result<(File, BuildSummary)>;

pub struct CdbWriter {
    tx: Option<SyncSender<Feed>>,
    handle: Option<JoinHandle<BuildResult>>,
    target: PathBuf,
    temp_path: PathBuf,
    cfg: CdbConfig,
    sent: u64,
    finished: bool,
}

fn open_temp(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.create(true).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o640);
    }
    let f = opts
        .open(path)
        .with_context(|| format!("open temp file {}", path.display()))?;
    f.try_lock_exclusive().with_context(|| {
        format!(
            "temp file {} is locked by another writer",
            path.display()
        )
    })?;
    // обрезаем только под lock'ом: чужой незавершённый файл не трогаем
    f.set_len(0)
        .with_context(|| format!("truncate temp file {}", path.display()))?;
    Ok(f)
}

impl CdbWriter {
    /// Writer с конфигурацией из окружения и временным файлом по умолчанию.
    pub fn create(target: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_config(target.as_ref(), None, CdbConfig::from_env())
    }

    pub fn create_with_config(target: &Path, tmp: Option<&Path>, cfg: CdbConfig) -> Result<Self> {
        let temp_path = match tmp {
            Some(p) => p.to_path_buf(),
            None => default_temp_path(target)?,
        };
        let f = open_temp(&temp_path)?;

        let (tx, rx) = sync_channel::<Feed>(cfg.channel_depth.max(1));
        let builder_cfg = cfg.clone();
        let handle = thread::Builder::new()
            .name("cdb-writer".to_string())
            .spawn(move || run_builder(f, rx, &builder_cfg))
            .context("spawn builder thread")?;

        debug!(
            "writer: building {} via {} ({})",
            target.display(),
            temp_path.display(),
            cfg
        );
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            target: target.to_path_buf(),
            temp_path,
            cfg,
            sent: 0,
            finished: false,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Сколько записей принято.
    pub fn records(&self) -> u64 {
        self.sent
    }

    /// Отдать запись builder'у. Блокируется, пока канал полон.
    pub fn put(&mut self, rec: Record) -> Result<()> {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return Err(self.already_failed()),
        };
        if tx.send(Feed::Record(rec)).is_err() {
            // builder остановился раньше времени: вернуть его ошибку
            return Err(self.builder_failure());
        }
        self.sent += 1;
        Ok(())
    }

    pub fn put_pair(&mut self, key: &[u8], data: &[u8]) -> Result<()> {
        self.put(Record::new(key, data))
    }

    fn already_failed(&self) -> anyhow::Error {
        anyhow!(
            "writer for {} already failed (temp file {} kept)",
            self.target.display(),
            self.temp_path.display()
        )
    }

    fn builder_failure(&mut self) -> anyhow::Error {
        self.tx = None;
        let joined = match self.handle.take() {
            Some(h) => h.join(),
            None => return self.already_failed(),
        };
        match joined {
            Ok(Err(e)) => e.context(format!(
                "build {} (temp file {} kept)",
                self.target.display(),
                self.temp_path.display()
            )),
            Ok(Ok(_)) => anyhow!("builder for {} stopped before end marker", self.target.display()),
            Err(_) => anyhow!("builder thread for {} panicked", self.target.display()),
        }
    }

    /// Завершить сборку и опубликовать файл.
    pub fn close(mut self) -> Result<BuildSummary> {
        self.finished = true;
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Feed::End);
        }
        let handle = match self.handle.take() {
            Some(h) => h,
            None => return Err(self.already_failed()),
        };
        let built = handle
            .join()
            .map_err(|_| anyhow!("builder thread for {} panicked", self.target.display()))?;

        let (f, summary) = match built {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    "writer: build failed, temp file {} left in place: {:#}",
                    self.temp_path.display(),
                    e
                );
                return Err(e.context(format!(
                    "build {} (temp file {} kept)",
                    self.target.display(),
                    self.temp_path.display()
                )));
            }
        };

        if self.cfg.fsync {
            f.sync_all()
                .with_context(|| format!("fsync {}", self.temp_path.display()))?;
        }
        drop(f);

        fs::rename(&self.temp_path, &self.target).with_context(|| {
            format!(
                "rename {} -> {}",
                self.temp_path.display(),
                self.target.display()
            )
        })?;
        info!(
            "writer: {} record(s) written to {} ({} bytes)",
            summary.records,
            self.target.display(),
            summary.file_len
        );
        Ok(summary)
    }

    /// Прервать сборку и удалить временный файл.
    pub fn abort(mut self) -> Result<()> {
        self.finished = true;
        self.abort_in_place()
            .with_context(|| format!("remove temp file {}", self.temp_path.display()))
    }

    fn abort_in_place(&mut self) -> std::io::Result<()> {
        // закрытие канала без Feed::End прерывает builder
        self.tx = None;
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
        debug!(
            "writer: aborted {}, removing {}",
            self.target.display(),
            self.temp_path.display()
        );
        match fs::remove_file(&self.temp_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for CdbWriter {
    fn drop(&mut self) {
        if !self.finished {
            // ошибки удаления на drop игнорируются
            let _ = self.abort_in_place();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CdbError;
    use crate::reader::CdbReader;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_dir(prefix: &str) -> PathBuf {
        let t = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let dir = std::env::temp_dir().join(format!("cdbkit-{}-{}-{}", prefix, std::process::id(), t));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn close_publishes_and_removes_temp() {
        let dir = unique_dir("writer-close");
        let target = dir.join("data.cdb");
        let cfg = CdbConfig::default().with_fsync(false);
        let mut w = CdbWriter::create_with_config(&target, None, cfg).unwrap();
        let tmp = w.temp_path().to_path_buf();
        assert!(tmp.exists());
        w.put_pair(b"alpha", b"1").unwrap();
        w.put(Record::new("beta", "2")).unwrap();
        assert_eq!(w.records(), 2);
        let summary = w.close().unwrap();
        assert_eq!(summary.records, 2);
        assert!(!tmp.exists());

        let mut r = CdbReader::open(&target).unwrap();
        assert_eq!(r.get(b"beta").unwrap(), Some(b"2".to_vec()));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_without_close_removes_temp() {
        let dir = unique_dir("writer-drop");
        let target = dir.join("data.cdb");
        let tmp = {
            let mut w = CdbWriter::create_with_config(&target, None, CdbConfig::default()).unwrap();
            w.put_pair(b"k", b"v").unwrap();
            w.temp_path().to_path_buf()
        };
        assert!(!tmp.exists());
        assert!(!target.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    /// Writer, чей builder сразу падает: канал без буфера, приёмник закрыт.
    fn failing_writer(dir: &Path) -> CdbWriter {
        let target = dir.join("data.cdb");
        let temp_path = dir.join(".data.cdb");
        fs::write(&temp_path, b"partial").unwrap();
        let (tx, rx) = sync_channel::<Feed>(0);
        let handle = thread::spawn(move || -> BuildResult {
            drop(rx);
            Err(CdbError::Aborted.into())
        });
        CdbWriter {
            tx: Some(tx),
            handle: Some(handle),
            target,
            temp_path,
            cfg: CdbConfig::default().with_fsync(false),
            sent: 0,
            finished: false,
        }
    }

    #[test]
    fn failed_build_on_close_keeps_temp() {
        let dir = unique_dir("writer-close-fail");
        let w = failing_writer(&dir);
        let tmp = w.temp_path().to_path_buf();
        let target = w.target().to_path_buf();

        let err = w.close().unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains(&tmp.display().to_string()), "{}", msg);
        assert!(tmp.exists());
        assert!(!target.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn close_after_failed_put_names_temp() {
        let dir = unique_dir("writer-put-fail");
        let mut w = failing_writer(&dir);
        let tmp = w.temp_path().to_path_buf();
        let target = w.target().to_path_buf();

        let err = w.put_pair(b"k", b"v").unwrap_err();
        assert!(err.chain().any(|c| c.to_string().contains("aborted")), "{:#}", err);
        assert_eq!(w.records(), 0);
        assert!(w.put_pair(b"k2", b"v2").is_err());

        let msg = format!("{:#}", w.close().unwrap_err());
        assert!(msg.contains("already failed"), "{}", msg);
        assert!(msg.contains(&tmp.display().to_string()), "{}", msg);
        assert!(tmp.exists());
        assert!(!target.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
