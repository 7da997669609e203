//! config: настройки сборки и чтения (CdbConfig).
//!
//! Источник: значения по умолчанию, поверх них переменные CDB_* (from_env),
//! в коде: цепочка with_*.
//!
//! Defaults:
//! - channel_depth = 1 (producer may run at most one record ahead of the builder)
//! - write_buffer_bytes = 64 KiB, read_buffer_bytes = 64 KiB
//! - fsync = true (temp file is synced before it is renamed into place)

use std::fmt;

/// Top-level configuration (builder/writer/reader).
#[derive(Clone, Debug)]
pub struct CdbConfig {
    /// Bounded channel depth between the record producer and the builder thread.
    /// Env: CDB_CHANNEL_DEPTH (default 1, values < 1 are raised to 1)
    pub channel_depth: usize,

    /// BufWriter capacity for the builder output.
    /// Env: CDB_WRITE_BUFFER_BYTES (default 65536)
    pub write_buffer_bytes: usize,

    /// BufReader capacity for text input and dump.
    /// Env: CDB_READ_BUFFER_BYTES (default 65536)
    pub read_buffer_bytes: usize,

    /// Whether to fsync the temp file before the atomic rename.
    /// Env: CDB_FSYNC (default true; "0|false|off|no" => false)
    pub fsync: bool,
}

impl Default for CdbConfig {
    fn default() -> Self {
        Self {
            channel_depth: 1,
            write_buffer_bytes: 64 * 1024,
            read_buffer_bytes: 64 * 1024,
            fsync: true,
        }
    }
}

fn env_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl CdbConfig {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("CDB_CHANNEL_DEPTH") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.channel_depth = n.max(1);
            }
        }

        if let Ok(v) = std::env::var("CDB_WRITE_BUFFER_BYTES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.write_buffer_bytes = n;
            }
        }

        if let Ok(v) = std::env::var("CDB_READ_BUFFER_BYTES") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.read_buffer_bytes = n;
            }
        }

        if let Ok(v) = std::env::var("CDB_FSYNC") {
            if let Some(on) = env_flag(&v) {
                cfg.fsync = on;
            }
        }

        cfg
    }

    pub fn with_channel_depth(mut self, depth: usize) -> Self {
        self.channel_depth = depth.max(1);
        self
    }

    pub fn with_write_buffer_bytes(mut self, n: usize) -> Self {
        self.write_buffer_bytes = n;
        self
    }

    pub fn with_read_buffer_bytes(mut self, n: usize) -> Self {
        self.read_buffer_bytes = n;
        self
    }

    pub fn with_fsync(mut self, on: bool) -> Self {
        self.fsync = on;
        self
    }

    /// Finish the builder and obtain the configuration.
    pub fn build(self) -> Self {
        self
    }
}

impl fmt::Display for CdbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CdbConfig {{ \
             channel_depth: {}, \
             write_buffer_bytes: {}, \
             read_buffer_bytes: {}, \
             fsync: {} \
             }}",
            self.channel_depth, self.write_buffer_bytes, self.read_buffer_bytes, self.fsync,
        )
    }
}
