//! Aggregate progress for the active batch and the status snapshot handed to
//! the presentation layer.

use serde::Serialize;

use crate::file::FileRecord;

/// Read-side view of a scheduler, recomputed from the records on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    /// The active batch has fully resolved.
    pub done: bool,
    /// Messages of every errored record, in collection order.
    pub errored: Vec<String>,
    pub uploading_count: usize,
    /// Active batch completion, 0..=100.
    pub progress: u8,
    pub current_batch: u32,
}

/// Bytes uploaded and total bytes over the records of `batch`.
pub fn batch_bytes(records: &[FileRecord], batch: u32) -> (u64, u64) {
    records
        .iter()
        .filter(|r| r.batch() == Some(batch))
        .fold((0u64, 0u64), |(done, total), r| {
            (
                done.saturating_add(r.progress_size()),
                total.saturating_add(r.size()),
            )
        })
}

/// Percentage complete for `batch`. An empty or zero-sized batch reads 0,
/// except that a zero reading is forced to 100 once `done`.
pub fn compute_progress(records: &[FileRecord], batch: u32, done: bool) -> u8 {
    let (uploaded, total) = batch_bytes(records, batch);
    let percent = if total == 0 {
        0
    } else {
        ((uploaded as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
    };
    if done && percent == 0 {
        100
    } else {
        percent
    }
}

/// Error messages of all errored records.
pub fn errored_messages(records: &[FileRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.error_message().map(str::to_string))
        .collect()
}
