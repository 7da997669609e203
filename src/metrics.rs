//! Lightweight global metrics for cdbkit.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Builder (records, bytes, tables, slots, builds)
//! - Dump
//! - Reader lookups

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Builder -----
static RECORDS_ADDED: AtomicU64 = AtomicU64::new(0);
static RECORD_BYTES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static TABLES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static SLOTS_WRITTEN: AtomicU64 = AtomicU64::new(0);
static BUILDS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static BUILDS_FAILED: AtomicU64 = AtomicU64::new(0);

// ----- Dump -----
static RECORDS_DUMPED: AtomicU64 = AtomicU64::new(0);

// ----- Reader -----
static LOOKUPS_TOTAL: AtomicU64 = AtomicU64::new(0);
static LOOKUP_HITS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    // Builder
    pub records_added: u64,
    pub record_bytes_written: u64,
    pub tables_written: u64,
    pub slots_written: u64,
    pub builds_completed: u64,
    pub builds_failed: u64,

    // Dump
    pub records_dumped: u64,

    // Reader
    pub lookups_total: u64,
    pub lookup_hits: u64,
}

impl MetricsSnapshot {
    pub fn lookup_hit_ratio(&self) -> f64 {
        if self.lookups_total == 0 {
            0.0
        } else {
            self.lookup_hits as f64 / self.lookups_total as f64
        }
    }
}

// ----- Recorders (Builder) -----
pub fn record_added(encoded_len: u64) {
    RECORDS_ADDED.fetch_add(1, Ordering::Relaxed);
    RECORD_BYTES_WRITTEN.fetch_add(encoded_len, Ordering::Relaxed);
}

pub fn record_table_written(slots: u64) {
    TABLES_WRITTEN.fetch_add(1, Ordering::Relaxed);
    SLOTS_WRITTEN.fetch_add(slots, Ordering::Relaxed);
}

pub fn record_build_completed() {
    BUILDS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_build_failed() {
    BUILDS_FAILED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Dump) -----
pub fn record_dumped() {
    RECORDS_DUMPED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Reader) -----
pub fn record_lookup(hit: bool) {
    LOOKUPS_TOTAL.fetch_add(1, Ordering::Relaxed);
    if hit {
        LOOKUP_HITS.fetch_add(1, Ordering::Relaxed);
    }
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        records_added: RECORDS_ADDED.load(Ordering::Relaxed),
        record_bytes_written: RECORD_BYTES_WRITTEN.load(Ordering::Relaxed),
        tables_written: TABLES_WRITTEN.load(Ordering::Relaxed),
        slots_written: SLOTS_WRITTEN.load(Ordering::Relaxed),
        builds_completed: BUILDS_COMPLETED.load(Ordering::Relaxed),
        builds_failed: BUILDS_FAILED.load(Ordering::Relaxed),

        records_dumped: RECORDS_DUMPED.load(Ordering::Relaxed),

        lookups_total: LOOKUPS_TOTAL.load(Ordering::Relaxed),
        lookup_hits: LOOKUP_HITS.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    RECORDS_ADDED.store(0, Ordering::Relaxed);
    RECORD_BYTES_WRITTEN.store(0, Ordering::Relaxed);
    TABLES_WRITTEN.store(0, Ordering::Relaxed);
    SLOTS_WRITTEN.store(0, Ordering::Relaxed);
    BUILDS_COMPLETED.store(0, Ordering::Relaxed);
    BUILDS_FAILED.store(0, Ordering::Relaxed);

    RECORDS_DUMPED.store(0, Ordering::Relaxed);

    LOOKUPS_TOTAL.store(0, Ordering::Relaxed);
    LOOKUP_HITS.store(0, Ordering::Relaxed);
}
