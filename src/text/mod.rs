//! text: текстовый формат обмена записями (cdbmake/cdbdump).
//!
//! - parse.rs: TextReader: текст -> записи (вход make).
//! - dump.rs : TextWriter и dump(): файл -> текст.

pub mod dump;
pub mod parse;

pub use dump::{dump, dump_with_config, TextWriter};
pub use parse::{parse_all, TextReader};
