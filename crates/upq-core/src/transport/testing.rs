//! In-memory transport for unit tests: records every dispatch and abort,
//! and never talks to the network. Tests drive outcomes by hand.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::file::UploadFile;

use super::{TransferHandle, Transport, TransportError, Ticket};

#[derive(Debug, Default)]
pub(crate) struct Recorded {
    pub(crate) created: Mutex<Vec<(Ticket, String)>>,
    pub(crate) aborted: Mutex<Vec<Ticket>>,
}

impl Recorded {
    pub(crate) fn created(&self) -> Vec<(Ticket, String)> {
        self.created.lock().unwrap().clone()
    }

    pub(crate) fn tickets(&self) -> Vec<Ticket> {
        self.created().into_iter().map(|(t, _)| t).collect()
    }

    /// Most recent ticket for the file named `name`.
    pub(crate) fn ticket_for(&self, name: &str) -> Ticket {
        self.created()
            .into_iter()
            .rev()
            .find(|(_, n)| n == name)
            .map(|(t, _)| t)
            .unwrap_or_else(|| panic!("no dispatch for {name}"))
    }

    pub(crate) fn aborted(&self) -> Vec<Ticket> {
        self.aborted.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub(crate) struct RecordingTransport {
    pub(crate) recorded: Arc<Recorded>,
    /// File names whose `create` fails synchronously.
    pub(crate) refuse: HashSet<String>,
}

impl RecordingTransport {
    pub(crate) fn new() -> (Self, Arc<Recorded>) {
        let t = Self::default();
        let recorded = Arc::clone(&t.recorded);
        (t, recorded)
    }
}

pub(crate) struct RecordingHandle {
    ticket: Ticket,
    recorded: Arc<Recorded>,
    aborts: AtomicUsize,
}

impl TransferHandle for RecordingHandle {
    fn abort(&mut self) {
        if self.aborts.fetch_add(1, Ordering::Relaxed) == 0 {
            self.recorded.aborted.lock().unwrap().push(self.ticket);
        }
    }
}

impl Transport for RecordingTransport {
    type Handle = RecordingHandle;

    fn create(&mut self, ticket: Ticket, file: &UploadFile) -> Result<Self::Handle, TransportError> {
        if self.refuse.contains(file.name()) {
            return Err(TransportError::Request(format!("cannot read {}", file.name())));
        }
        self.recorded
            .created
            .lock()
            .unwrap()
            .push((ticket, file.name().to_string()));
        Ok(RecordingHandle {
            ticket,
            recorded: Arc::clone(&self.recorded),
            aborts: AtomicUsize::new(0),
        })
    }
}
