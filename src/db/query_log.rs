//! Per-connection query log.

use crate::models::QueryRecord;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Upper bound on retained entries; the oldest entry is dropped first.
pub const QUERIES_LOG_LIMIT: usize = 9000;

/// Bounded record of executed queries, used for debugging and profiling.
///
/// Uses std::sync::Mutex - the log is never touched across an await point.
#[derive(Debug)]
pub struct QueryLog {
    entries: Mutex<VecDeque<QueryRecord>>,
    limit: usize,
}

impl QueryLog {
    pub fn new() -> Self {
        Self::with_limit(QUERIES_LOG_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    pub fn record(&self, record: QueryRecord) {
        if self.limit == 0 {
            return;
        }
        let mut entries = self.lock();
        if entries.len() >= self.limit {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Drop every entry. Never fails.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<QueryRecord> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueryRecord>> {
        // A panic while holding the lock leaves the deque intact
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_clear() {
        let log = QueryLog::new();
        log.record(QueryRecord::new("SELECT 1", 0, 1));
        log.record(QueryRecord::new("SELECT 2", 0, 1));
        assert_eq!(log.len(), 2);

        log.clear();
        assert!(log.is_empty());
        // Clearing twice is harmless
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_oldest_entry_dropped_at_limit() {
        let log = QueryLog::with_limit(2);
        log.record(QueryRecord::new("a", 0, 0));
        log.record(QueryRecord::new("b", 0, 0));
        log.record(QueryRecord::new("c", 0, 0));

        let sql: Vec<_> = log.snapshot().into_iter().map(|r| r.sql).collect();
        assert_eq!(sql, vec!["b", "c"]);
    }

    #[test]
    fn test_zero_limit_records_nothing() {
        let log = QueryLog::with_limit(0);
        log.record(QueryRecord::new("a", 0, 0));
        assert!(log.is_empty());
    }
}
