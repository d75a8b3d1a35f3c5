use serde::{Deserialize, Serialize};

/// Table locking discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockMode {
    /// No table locks at all. Only safe for single-session embedded use.
    Off,
    /// Shared/exclusive table locks held to the end of the transaction.
    #[default]
    Table,
    /// Shared locks are released right after the read completes; in
    /// single-threaded non-MVCC mode shared acquires are free.
    ReadCommitted,
}

/// Engine settings threaded through every operation via the database
/// context. No module-level mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbSettings {
    /// After this many changes the table statistics are recomputed; the
    /// threshold doubles after every run. 0 disables auto-analyze.
    pub analyze_auto: u32,
    /// Row sample budget for ANALYZE; each run samples a tenth of it.
    pub analyze_sample: u32,
    /// In-RAM row budget for index rebuilds. The block-merge builder uses
    /// half of it per block.
    pub max_memory_rows: usize,
    pub lock_mode: LockMode,
    /// When true, each table synchronizes on its own monitor; otherwise
    /// all tables share the database-wide monitor.
    pub multi_threaded: bool,
    /// Multi-version concurrency: writers take shared table locks and
    /// plain reads do not lock at all.
    pub mvcc: bool,
    /// Lock timeout for new sessions, in milliseconds.
    pub default_lock_timeout_ms: u64,
    /// When false, `can_truncate` ignores referential constraints.
    pub referential_integrity: bool,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            analyze_auto: 2000,
            analyze_sample: 10_000,
            max_memory_rows: 40_000,
            lock_mode: LockMode::Table,
            multi_threaded: true,
            mvcc: false,
            default_lock_timeout_ms: 2_000,
            referential_integrity: true,
        }
    }
}

#[cfg(test)]
mod settings_tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let s = DbSettings::default();
        assert!(s.analyze_auto > 0);
        assert!(s.max_memory_rows >= 2);
        assert_eq!(s.lock_mode, LockMode::Table);
        assert!(s.default_lock_timeout_ms > 0);
    }
}
