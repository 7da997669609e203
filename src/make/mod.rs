//! make: сборка файла.
//!
//! - builder.rs : CdbBuilder: потоковая запись записей, таблиц и header;
//! - pipeline.rs: producer/consumer через ограниченный канал;
//! - file.rs    : временный файл + rename.

pub mod builder;
pub mod file;
pub mod pipeline;

pub use builder::{BuildSummary, CdbBuilder};
pub use file::make_file;
pub use pipeline::{make, make_from_records, run_builder, Feed};
