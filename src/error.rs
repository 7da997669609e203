//! Типизированные ошибки формата.
//!
//! Библиотека возвращает `anyhow::Result`; конкретный вид ошибки достаётся через
//! `err.downcast_ref::<CdbError>()`. Ошибки ввода-вывода остаются `std::io::Error`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CdbError {
    /// Нарушение текстового формата или структуры файла.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// Позиция, которую ведёт builder, разошлась с позицией файла.
    #[error("internal inconsistency: tracked pos={tracked}, file pos={actual}")]
    Inconsistent { tracked: u64, actual: u64 },

    /// Смещение не помещается в u32.
    #[error("database too large: {what} would end at {end} (max 4294967295)")]
    TooLarge { what: &'static str, end: u64 },

    /// Поток записей закрыт без маркера конца.
    #[error("record stream aborted before end marker")]
    Aborted,
}

impl CdbError {
    pub fn bad_format(msg: impl Into<String>) -> Self {
        CdbError::BadFormat(msg.into())
    }
}

/// true, если в цепочке ошибки есть CdbError::BadFormat.
pub fn is_bad_format(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<CdbError>(), Some(CdbError::BadFormat(_)))
}
