// Формат файла и примитивы
pub mod consts;
pub mod hash;
pub mod error;
pub mod record;
pub mod layout;

// Окружение
pub mod config;
pub mod metrics;
pub mod util;

// Текстовый формат обмена (make/dump)
pub mod text;

// Сборка: builder, конвейер, файл с атомарной публикацией
pub mod make;

// Writer-handle, чтение и проверка
pub mod writer;
pub mod reader;
pub mod check;
pub mod stats;

// Удобные реэкспорты
pub use check::{check_file, CheckReport};
pub use config::CdbConfig;
pub use error::{is_bad_format, CdbError};
pub use hash::{cdb_hash, CdbHasher};
pub use layout::{Header, HeaderEntry, Slot};
pub use make::{make, make_file, make_from_records, BuildSummary, CdbBuilder, Feed};
pub use reader::{CdbReader, RecordIter};
pub use record::Record;
pub use stats::{stats_file, DbStats};
pub use text::{dump, TextReader, TextWriter};
pub use writer::CdbWriter;
