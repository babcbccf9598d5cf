//! Transport seam between the scheduler and whatever moves the bytes.
//!
//! The scheduler calls [`Transport::create`] once per dispatch and keeps the
//! returned handle. The transport reports back through [`TransportEvent`]s:
//! zero or more `Progress` events, then exactly one `Outcome`. Every event
//! carries the dispatch [`Ticket`] so stale events can be dropped.

pub mod http;
#[cfg(test)]
pub(crate) mod testing;

use tokio::sync::mpsc;

use crate::file::{FileId, UploadFile};

pub use http::{
    json_metadata, raw_body, FormRequest, HttpTimeouts, HttpTransport, HttpTransportBuilder,
    RequestBody,
};

/// Identifies one dispatch of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket {
    pub file: FileId,
    pub dispatch: u64,
}

/// Successful server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u32,
    pub body: Vec<u8>,
}

impl UploadResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failed upload, as seen by the failure callback and recorded on the file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Server answered with a non-2xx status. The display text carries the
    /// start of the response body, if any.
    #[error("server returned HTTP {status}{}", body_excerpt(.body))]
    Http { status: u32, body: String },
    /// Connection, timeout or other transfer failure.
    #[error("network error: {0}")]
    Network(String),
    /// The request could not be built (e.g. payload unreadable).
    #[error("could not build request: {0}")]
    Request(String),
}

impl From<curl::Error> for TransportError {
    fn from(e: curl::Error) -> Self {
        TransportError::Network(e.to_string())
    }
}

/// Report from a running transfer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Progress {
        ticket: Ticket,
        loaded: u64,
        total: u64,
    },
    Outcome {
        ticket: Ticket,
        result: Result<UploadResponse, TransportError>,
    },
}

const BODY_EXCERPT_CHARS: usize = 200;

fn body_excerpt(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }
    let mut excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();
    if excerpt.len() < body.len() {
        excerpt.push_str("...");
    }
    format!(": {excerpt}")
}

/// Handle to one in-flight transfer, owned by the scheduler.
pub trait TransferHandle {
    /// Cancel the transfer. After this the transfer must not report an outcome
    /// the scheduler acts on; the scheduler also drops events for stale tickets.
    fn abort(&mut self);
}

/// Starts uploads.
pub trait Transport {
    type Handle: TransferHandle;

    /// Begin uploading `file`. Errors returned here are treated as an immediate
    /// failed outcome for this dispatch.
    fn create(&mut self, ticket: Ticket, file: &UploadFile) -> Result<Self::Handle, TransportError>;
}

pub type EventSender = mpsc::Sender<TransportEvent>;
pub type EventReceiver = mpsc::Receiver<TransportEvent>;

/// Channel transports use to send events to an [`UploadSession`](crate::session::UploadSession).
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(capacity.max(1))
}
