//! Upload scheduler.
//!
//! Owns the file records, validates new files, dispatches pending files to the
//! transport under a concurrency cap, and folds transport events back into
//! the records. Synchronous and single-owner: the caller (usually
//! [`UploadSession`](crate::session::UploadSession)) feeds it commands and
//! transport events one at a time.
//!
//! Dispatch follows insertion order. The number of uploading records is
//! recounted before every dispatch decision, so the cap is never exceeded.

mod batch;
mod hooks;
mod progress;

use std::collections::HashMap;

use crate::config::ConfigError;
use crate::file::{FileId, FileRecord, FileState, UploadFile};
use crate::transport::{
    TransferHandle, Transport, TransportError, TransportEvent, Ticket, UploadResponse,
};
use crate::validate::{self, ValidationRules};

pub use batch::{is_batch_complete, uploading_count, BatchController};
pub use hooks::{FailureCallback, SuccessCallback, UploadHooks, UploadHooksBuilder};
pub use progress::{batch_bytes, compute_progress, errored_messages, UploadStatus};

/// Scheduler knobs, usually built from [`UploadConfig`](crate::config::UploadConfig).
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub max_concurrent: usize,
    pub auto_upload: bool,
    pub rules: ValidationRules,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            auto_upload: true,
            rules: ValidationRules::default(),
        }
    }
}

/// Misuse of the imperative scheduler API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("no file with id {0}")]
    UnknownFile(FileId),
    #[error("file {0} is already uploading")]
    AlreadyUploading(FileId),
    #[error("file {0} failed validation and cannot be uploaded")]
    NotDispatchable(FileId),
    #[error("concurrency cap of {max} uploads reached")]
    AtCapacity { max: usize },
}

struct InFlight<H> {
    ticket: Ticket,
    handle: H,
    keep_going: bool,
}

pub struct UploadScheduler<T: Transport> {
    transport: T,
    hooks: UploadHooks,
    options: SchedulerOptions,
    records: Vec<FileRecord>,
    in_flight: HashMap<FileId, InFlight<T::Handle>>,
    batches: BatchController,
    next_id: u64,
    next_dispatch: u64,
}

impl<T: Transport> UploadScheduler<T> {
    pub fn new(transport: T, hooks: UploadHooks, options: SchedulerOptions) -> Result<Self, ConfigError> {
        if options.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(Self {
            transport,
            hooks,
            options,
            records: Vec::new(),
            in_flight: HashMap::new(),
            batches: BatchController::new(),
            next_id: 0,
            next_dispatch: 0,
        })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, id: FileId) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn current_batch(&self) -> u32 {
        self.batches.current()
    }

    pub fn uploading_count(&self) -> usize {
        uploading_count(&self.records)
    }

    /// Number of dispatches still waiting for an outcome.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Snapshot for the presentation layer.
    pub fn status(&self) -> UploadStatus {
        let batch = self.batches.current();
        let done = is_batch_complete(&self.records, batch);
        UploadStatus {
            done,
            errored: errored_messages(&self.records),
            uploading_count: uploading_count(&self.records),
            progress: compute_progress(&self.records, batch, done),
            current_batch: batch,
        }
    }

    /// Append and validate one file. Never rejected: validation failures are
    /// recorded on the record as `Errored`.
    pub fn add_file(&mut self, file: UploadFile) -> FileId {
        let id = FileId(self.next_id);
        self.next_id += 1;
        let mut record = FileRecord::new(id, file);

        match validate::validate(record.file(), &self.options.rules) {
            Ok(()) => {
                let batch = self.batches.admit();
                record.admit(batch);
                tracing::debug!(file = %record.name(), %id, batch, "file queued");
            }
            Err(err) => {
                tracing::info!(file = %record.name(), %id, "file rejected: {}", err);
                record.mark_errored(err.to_string());
            }
        }
        self.records.push(record);

        if self.options.auto_upload {
            self.upload_all();
        }
        self.batches.settle(&self.records);
        id
    }

    pub fn add_files<I>(&mut self, files: I) -> Vec<FileId>
    where
        I: IntoIterator<Item = UploadFile>,
    {
        files.into_iter().map(|f| self.add_file(f)).collect()
    }

    /// Dispatch pending files in order while slots are free.
    pub fn upload_all(&mut self) {
        let max = self.options.max_concurrent;
        let mut index = 0;
        while index < self.records.len() {
            if uploading_count(&self.records) >= max {
                break;
            }
            if self.records[index].state() == FileState::Pending {
                // Synchronous transport failures are already recorded; the scan
                // itself moves on to the next pending file.
                let _ = self.dispatch(index, true);
            }
            index += 1;
        }
        self.batches.settle(&self.records);
    }

    /// Dispatch one file. When the dispatch resolves and `keep_going` is set,
    /// [`upload_all`](Self::upload_all) runs to fill the freed slot.
    pub fn upload(&mut self, id: FileId, keep_going: bool) -> Result<(), SchedulerError> {
        let index = self.index_of(id)?;
        let record = &self.records[index];
        if record.state() == FileState::Uploading {
            return Err(SchedulerError::AlreadyUploading(id));
        }
        if record.batch().is_none() {
            return Err(SchedulerError::NotDispatchable(id));
        }
        let max = self.options.max_concurrent;
        if uploading_count(&self.records) >= max {
            return Err(SchedulerError::AtCapacity { max });
        }

        if self.dispatch(index, keep_going).is_err() && keep_going {
            self.upload_all();
        }
        self.batches.settle(&self.records);
        Ok(())
    }

    /// Abort any in-flight transfer, mark stopped, reset progress. Idempotent.
    pub fn stop(&mut self, id: FileId) -> Result<(), SchedulerError> {
        let index = self.index_of(id)?;
        let keep_going = self.stop_at(index);
        if keep_going {
            self.upload_all();
        }
        self.batches.settle(&self.records);
        Ok(())
    }

    /// `stop` every record regardless of state.
    pub fn stop_all(&mut self) {
        let mut keep_going = false;
        for index in 0..self.records.len() {
            keep_going |= self.stop_at(index);
        }
        if keep_going {
            self.upload_all();
        }
        self.batches.settle(&self.records);
    }

    /// Stop the file, then drop it from the collection.
    pub fn remove(&mut self, id: FileId) -> Result<FileRecord, SchedulerError> {
        let index = self.index_of(id)?;
        let keep_going = self.stop_at(index);
        let removed = self.records.remove(index);
        tracing::debug!(file = %removed.name(), %id, "file removed");
        if keep_going {
            self.upload_all();
        }
        self.batches.settle(&self.records);
        Ok(removed)
    }

    /// Remove every record. Returns how many were removed.
    pub fn remove_all(&mut self) -> usize {
        for index in 0..self.records.len() {
            self.stop_at(index);
        }
        let removed = self.records.len();
        self.records.clear();
        if removed > 0 {
            tracing::debug!(removed, "all files removed");
        }
        self.batches.settle(&self.records);
        removed
    }

    /// Route a transport event. Returns false if it was stale and ignored.
    pub fn handle(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Progress {
                ticket,
                loaded,
                total,
            } => self.on_progress(ticket, loaded, total),
            TransportEvent::Outcome { ticket, result } => self.on_outcome(ticket, result),
        }
    }

    /// Fold an upload-progress report into the record. Reports without a known
    /// total, or for a dispatch that is no longer live, are ignored.
    pub fn on_progress(&mut self, ticket: Ticket, loaded: u64, total: u64) -> bool {
        if total == 0 || !self.is_live(ticket) {
            return false;
        }
        let Ok(index) = self.index_of(ticket.file) else {
            return false;
        };
        let percent = ((loaded as f64 / total as f64) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8;
        self.records[index].advance_progress(percent)
    }

    /// Resolve a dispatch. Runs the matching callback and, if the dispatch was
    /// started with `keep_going`, backfills the freed slot.
    pub fn on_outcome(
        &mut self,
        ticket: Ticket,
        result: Result<UploadResponse, TransportError>,
    ) -> bool {
        if !self.is_live(ticket) {
            tracing::debug!(file = %ticket.file, dispatch = ticket.dispatch, "stale upload outcome ignored");
            return false;
        }
        let Some(flight) = self.in_flight.remove(&ticket.file) else {
            return false;
        };
        let Ok(index) = self.index_of(ticket.file) else {
            return false;
        };

        match result {
            Ok(response) => {
                self.records[index].complete();
                let record = &self.records[index];
                tracing::info!(file = %record.name(), status = response.status, "upload complete");
                self.hooks.succeeded(&response, record);
            }
            Err(err) => self.fail(index, &err),
        }
        drop(flight.handle);

        if flight.keep_going {
            self.upload_all();
        }
        self.batches.settle(&self.records);
        true
    }

    fn index_of(&self, id: FileId) -> Result<usize, SchedulerError> {
        self.records
            .iter()
            .position(|r| r.id() == id)
            .ok_or(SchedulerError::UnknownFile(id))
    }

    fn is_live(&self, ticket: Ticket) -> bool {
        self.in_flight
            .get(&ticket.file)
            .is_some_and(|f| f.ticket == ticket)
    }

    /// Start the transport for `records[index]`. A synchronous transport error
    /// resolves the dispatch as failed on the spot.
    fn dispatch(&mut self, index: usize, keep_going: bool) -> Result<(), TransportError> {
        let ticket = Ticket {
            file: self.records[index].id(),
            dispatch: self.next_dispatch,
        };
        self.next_dispatch += 1;
        self.records[index].begin_upload();

        match self.transport.create(ticket, self.records[index].file()) {
            Ok(handle) => {
                tracing::debug!(
                    file = %self.records[index].name(),
                    id = %ticket.file,
                    dispatch = ticket.dispatch,
                    "upload dispatched"
                );
                self.in_flight.insert(
                    ticket.file,
                    InFlight {
                        ticket,
                        handle,
                        keep_going,
                    },
                );
                Ok(())
            }
            Err(err) => {
                self.fail(index, &err);
                Err(err)
            }
        }
    }

    fn fail(&mut self, index: usize, err: &TransportError) {
        self.records[index].mark_errored(err.to_string());
        let record = &self.records[index];
        tracing::warn!(file = %record.name(), "upload failed: {}", err);
        self.hooks.failed(err, record);
    }

    /// Abort and stop `records[index]`. Returns the aborted dispatch's `keep_going`.
    fn stop_at(&mut self, index: usize) -> bool {
        let id = self.records[index].id();
        let keep_going = match self.in_flight.remove(&id) {
            Some(mut flight) => {
                flight.handle.abort();
                tracing::debug!(file = %self.records[index].name(), %id, "upload aborted");
                flight.keep_going
            }
            None => false,
        };
        self.records[index].stop();
        keep_going
    }
}
