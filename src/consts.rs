//! Общие константы формата (header, records, secondary tables).
//!
//! Раскладка файла (все числа LE u32):
//! [header: 256 × (table_off u32, table_slots u32)] = 2048 байт
//! [records: klen u32, dlen u32, key, data] × N, без выравнивания
//! [secondary tables: table_slots × (hash u32, pos u32)] для бакетов 0..255

// -------- Header --------
pub const BUCKETS: usize = 256;
pub const HEADER_ENTRY_SIZE: usize = 8; // [table_off u32][table_slots u32]
pub const HEADER_SIZE: usize = BUCKETS * HEADER_ENTRY_SIZE;

// -------- Records --------
pub const REC_HDR_SIZE: usize = 8; // [klen u32][dlen u32]

// -------- Secondary tables --------
pub const SLOT_SIZE: usize = 8; // [hash u32][pos u32]
// Ёмкость таблицы = TABLE_LOAD_FACTOR × число записей в бакете.
pub const TABLE_LOAD_FACTOR: usize = 2;

// -------- Checksum --------
pub const HASH_START: u32 = 5381;

// -------- Files --------
// Временный файл писателя: скрытый ".<name>" рядом с целевым.
pub const TEMP_PREFIX: &str = ".";
