// tests/files.rs
//
// Файловый уровень: make_file (временный файл + rename), writer-handle,
// поведение при ошибках, check/stats по пути.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use cdbkit::check::check_file;
use cdbkit::config::CdbConfig;
use cdbkit::error::{is_bad_format, CdbError};
use cdbkit::make::make_file;
use cdbkit::reader::CdbReader;
use cdbkit::stats::stats_file;
use cdbkit::util::default_temp_path;
use cdbkit::writer::CdbWriter;
use cdbkit::Record;

fn unique_root(prefix: &str) -> PathBuf {
    let pid = std::process::id();
    let t = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("cdbkit-{}-{}-{}", prefix, pid, t))
}

fn cfg() -> CdbConfig {
    CdbConfig::default().with_fsync(false)
}

#[test]
fn make_file_publishes_and_cleans_temp() -> Result<()> {
    let root = unique_root("make-file");
    fs::create_dir_all(&root)?;
    let target = root.join("db.cdb");

    let text = b"+5,1:alpha->1\n+4,1:beta->2\n+5,3:alpha->one\n\n";
    let summary = make_file(&target, None, &text[..], &cfg())?;
    assert_eq!(summary.records, 3);
    assert!(target.exists());
    assert!(!default_temp_path(&target)?.exists());
    assert_eq!(fs::metadata(&target)?.len(), summary.file_len);

    let mut r = CdbReader::open(&target)?;
    assert_eq!(r.get(b"alpha")?, Some(b"1".to_vec()));
    assert_eq!(r.find(b"alpha")?, vec![b"1".to_vec(), b"one".to_vec()]);

    let report = check_file(&target)?;
    assert!(report.ok, "{:?}", report.errors);
    let st = stats_file(&target)?;
    assert_eq!(st.records, 3);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn malformed_input_leaves_target_untouched() -> Result<()> {
    let root = unique_root("make-bad");
    fs::create_dir_all(&root)?;
    let target = root.join("db.cdb");
    let tmp = root.join("build.tmp");

    let err = make_file(&target, Some(&tmp), &b"+3,3:foo-bar\n"[..], &cfg()).unwrap_err();
    assert!(is_bad_format(&err), "{:#}", err);
    assert!(!target.exists(), "no output file on bad input");
    // временный файл остаётся для разбора
    assert!(tmp.exists());

    // старая версия целевого файла не затирается
    make_file(&target, Some(&tmp), &b"+1,1:k->v\n\n"[..], &cfg())?;
    let before = fs::read(&target)?;
    assert!(make_file(&target, Some(&tmp), &b"+1,1:k->v\n"[..], &cfg()).is_err());
    assert_eq!(fs::read(&target)?, before);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn writer_handle_publishes_atomically() -> Result<()> {
    let root = unique_root("writer");
    fs::create_dir_all(&root)?;
    let target = root.join("w.cdb");

    let mut w = CdbWriter::create_with_config(&target, None, cfg().with_channel_depth(4))?;
    let tmp = w.temp_path().to_path_buf();
    for i in 0..1000u32 {
        w.put(Record::new(format!("key{}", i), i.to_le_bytes().to_vec()))?;
    }
    w.put_pair(b"", b"empty key")?;
    // до close целевого файла нет
    assert!(!target.exists());
    let summary = w.close()?;
    assert_eq!(summary.records, 1001);
    assert!(target.exists());
    assert!(!tmp.exists(), "temp file must be renamed away");

    let mut r = CdbReader::open(&target)?;
    assert_eq!(r.get(b"key777")?, Some(777u32.to_le_bytes().to_vec()));
    assert_eq!(r.get(b"")?, Some(b"empty key".to_vec()));

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn second_writer_for_same_target_fails() -> Result<()> {
    let root = unique_root("writer-lock");
    fs::create_dir_all(&root)?;
    let target = root.join("w.cdb");

    let mut first = CdbWriter::create_with_config(&target, None, cfg())?;
    first.put_pair(b"a", b"1")?;
    assert!(CdbWriter::create_with_config(&target, None, cfg()).is_err());

    // первый writer не пострадал
    first.put_pair(b"b", b"2")?;
    let summary = first.close()?;
    assert_eq!(summary.records, 2);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn abort_removes_temp_and_skips_target() -> Result<()> {
    let root = unique_root("writer-abort");
    fs::create_dir_all(&root)?;
    let target = root.join("w.cdb");

    let mut w = CdbWriter::create_with_config(&target, None, cfg())?;
    w.put_pair(b"a", b"1")?;
    let tmp = w.temp_path().to_path_buf();
    w.abort()?;
    assert!(!tmp.exists());
    assert!(!target.exists());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn corrupted_header_is_flagged_by_check() -> Result<()> {
    let root = unique_root("check-corrupt");
    fs::create_dir_all(&root)?;
    let target = root.join("c.cdb");
    make_file(&target, None, &b"+3,3:foo->bar\n+3,3:baz->qux\n\n"[..], &cfg())?;

    let mut bytes = fs::read(&target)?;
    // нечётный размер таблицы в entry[255]
    bytes[255 * 8 + 4] |= 1;
    fs::write(&target, &bytes)?;

    let report = check_file(&target)?;
    assert!(!report.ok);
    assert!(report.errors_total > 0);

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn truncated_file_is_bad_format() -> Result<()> {
    let root = unique_root("truncated");
    fs::create_dir_all(&root)?;
    let target = root.join("t.cdb");
    fs::write(&target, vec![0u8; 100])?;

    let err = CdbReader::open(&target).err().expect("short file must fail");
    assert!(matches!(
        err.downcast_ref::<CdbError>(),
        Some(CdbError::BadFormat(_))
    ));
    let _ = fs::remove_dir_all(&root);
    Ok(())
}

#[test]
fn reports_serialize_to_json() -> Result<()> {
    let root = unique_root("json");
    fs::create_dir_all(&root)?;
    let target = root.join("j.cdb");
    make_file(&target, None, &b"+1,1:a->b\n\n"[..], &cfg())?;

    let report = check_file(&target)?;
    let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&report)?)?;
    assert_eq!(v["ok"], serde_json::Value::Bool(true));
    assert_eq!(v["records"], 1);

    let st = stats_file(&target)?;
    let v = serde_json::to_value(&st)?;
    assert_eq!(v["records"], 1);
    assert_eq!(v["distances"].as_array().map(|a| a.len()), Some(11));

    let ms = serde_json::to_value(cdbkit::metrics::snapshot())?;
    assert!(ms.get("builds_completed").is_some());

    let _ = fs::remove_dir_all(&root);
    Ok(())
}
