//! Batch completion detection and the batch counter.
//!
//! Detection is a pure query over the records; advancing is an explicit
//! mutation. [`BatchController::settle`] joins the two and is called by the
//! scheduler after every state change.

use crate::file::{FileRecord, FileState};

/// True when `batch` has nothing left pending or uploading.
/// Always false for an empty collection.
pub fn is_batch_complete(records: &[FileRecord], batch: u32) -> bool {
    if records.is_empty() {
        return false;
    }
    !records
        .iter()
        .any(|r| r.batch() == Some(batch) && r.state().is_active())
}

/// Number of records currently uploading, counted from the live slice.
pub fn uploading_count(records: &[FileRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.state() == FileState::Uploading)
        .count()
}

/// Owns the current batch number.
#[derive(Debug, Default)]
pub struct BatchController {
    current: u32,
}

impl BatchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u32 {
        self.current
    }

    /// Batch number for a newly validated file.
    pub fn admit(&self) -> u32 {
        self.current
    }

    pub fn advance(&mut self) {
        self.current += 1;
    }

    /// Checks the current batch and advances once it has fully resolved.
    /// A batch with no members left (never filled, or all removed) stays put,
    /// so a finished batch advances the counter exactly once.
    /// Returns whether the current batch (before any advance) is complete.
    pub fn settle(&mut self, records: &[FileRecord]) -> bool {
        let complete = is_batch_complete(records, self.current);
        let has_members = records.iter().any(|r| r.batch() == Some(self.current));
        if complete && has_members {
            let finished = self.current;
            self.advance();
            tracing::info!(batch = finished, next = self.current, "batch complete");
        }
        complete
    }
}
