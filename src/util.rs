use anyhow::{Context, Result};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::consts::TEMP_PREFIX;
use crate::error::CdbError;

/// seek + read_exact. Короткий файл: BadFormat, а не голый EOF.
pub fn read_at<F: Read + Seek>(f: &mut F, offset: u64, buf: &mut [u8]) -> Result<()> {
    f.seek(SeekFrom::Start(offset))
        .with_context(|| format!("seek to {}", offset))?;
    f.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            anyhow::Error::new(CdbError::bad_format(format!(
                "truncated file: {} byte(s) at offset {} not available",
                buf.len(),
                offset
            )))
        } else {
            anyhow::Error::new(e).context(format!("read {} byte(s) at {}", buf.len(), offset))
        }
    })
}

/// Байты в hex, по 16 на строку.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .map(|line| {
            line.iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Значение как текст, если это UTF-8; иначе только длина.
pub fn display_text(bytes: &[u8]) -> String {
    String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| format!("<{} non-utf8 byte(s)>", bytes.len()))
}

/// Временный файл по умолчанию: ".<имя>" рядом с целевым.
pub fn default_temp_path(target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("target path {} has no file name", target.display()))?;
    let mut tmp_name = std::ffi::OsString::from(TEMP_PREFIX);
    tmp_name.push(name);
    Ok(target.with_file_name(tmp_name))
}
