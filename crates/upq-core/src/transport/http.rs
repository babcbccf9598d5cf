//! HTTP upload transport (libcurl).
//!
//! Each dispatch runs one blocking curl transfer on the tokio blocking pool.
//! Upload progress is sent as it arrives; the outcome is sent once the
//! transfer ends, unless the transfer was aborted.

use std::fs::File;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Handle;

use crate::cancel::CancelToken;
use crate::config::ConfigError;
use crate::file::{FileSource, UploadFile};

use super::{
    EventSender, TransferHandle, Transport, TransportError, TransportEvent, Ticket, UploadResponse,
};

/// Request payload. On-disk files are streamed from an open handle.
#[derive(Debug)]
pub enum RequestBody {
    Bytes(Arc<[u8]>),
    File { file: File, len: u64 },
}

impl RequestBody {
    pub(crate) fn len(&self) -> u64 {
        match self {
            RequestBody::Bytes(bytes) => bytes.len() as u64,
            RequestBody::File { len, .. } => *len,
        }
    }

    fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            RequestBody::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            RequestBody::File { file, len } => Box::new(file.take(len)),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(bytes.into())
    }
}

/// Builds the request body for one file. Runs on the blocking pool, so it
/// may touch the filesystem.
pub type FormRequest = Arc<dyn Fn(&UploadFile) -> anyhow::Result<RequestBody> + Send + Sync>;

/// Sends the file bytes unchanged.
pub fn raw_body(file: &UploadFile) -> anyhow::Result<RequestBody> {
    match file.source() {
        FileSource::Memory(bytes) => Ok(RequestBody::Bytes(Arc::clone(bytes))),
        FileSource::Disk(path) => {
            let handle =
                File::open(path).with_context(|| format!("open {}", path.display()))?;
            let len = handle.metadata()?.len();
            Ok(RequestBody::File { file: handle, len })
        }
    }
}

/// Sends `{"name": .., "size": ..}` instead of the payload.
pub fn json_metadata(file: &UploadFile) -> anyhow::Result<RequestBody> {
    let body = serde_json::json!({
        "name": file.name(),
        "size": file.size(),
    });
    Ok(serde_json::to_vec(&body)?.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub total: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            total: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug)]
struct RequestSpec {
    url: String,
    content_type: String,
    method: String,
    timeouts: HttpTimeouts,
}

pub struct HttpTransportBuilder {
    events: EventSender,
    url: Option<String>,
    content_type: String,
    method: String,
    form_request: Option<FormRequest>,
    timeouts: HttpTimeouts,
}

impl HttpTransportBuilder {
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn timeouts(mut self, timeouts: HttpTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn form_request<F>(mut self, f: F) -> Self
    where
        F: Fn(&UploadFile) -> anyhow::Result<RequestBody> + Send + Sync + 'static,
    {
        self.form_request = Some(Arc::new(f));
        self
    }

    /// Fails on a missing or unparseable URL, a missing body former, or when
    /// called outside a tokio runtime.
    pub fn build(self) -> Result<HttpTransport, ConfigError> {
        let url = self
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        url::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let form_request = self.form_request.ok_or(ConfigError::MissingFormRequest)?;
        let runtime = Handle::try_current().map_err(|e| ConfigError::NoRuntime(e.to_string()))?;
        let method = self.method.trim().to_ascii_uppercase();
        Ok(HttpTransport {
            spec: Arc::new(RequestSpec {
                url,
                content_type: self.content_type,
                method: if method.is_empty() { "POST".to_string() } else { method },
                timeouts: self.timeouts,
            }),
            form_request,
            events: self.events,
            runtime,
        })
    }
}

/// Uploads each file with one HTTP request.
pub struct HttpTransport {
    spec: Arc<RequestSpec>,
    form_request: FormRequest,
    events: EventSender,
    runtime: Handle,
}

impl HttpTransport {
    /// Defaults: `POST`, `application/json`, 30s connect / 1h total timeouts.
    pub fn builder(events: EventSender) -> HttpTransportBuilder {
        HttpTransportBuilder {
            events,
            url: None,
            content_type: "application/json".to_string(),
            method: "POST".to_string(),
            form_request: None,
            timeouts: HttpTimeouts::default(),
        }
    }

    pub fn url(&self) -> &str {
        &self.spec.url
    }

    pub fn method(&self) -> &str {
        &self.spec.method
    }
}

/// In-flight HTTP upload. Aborting sets the token the progress callback polls.
pub struct HttpTransfer {
    token: CancelToken,
    _task: tokio::task::JoinHandle<()>,
}

impl TransferHandle for HttpTransfer {
    fn abort(&mut self) {
        if self.token.cancel() {
            tracing::debug!("upload abort requested");
        }
    }
}

impl Transport for HttpTransport {
    type Handle = HttpTransfer;

    fn create(&mut self, ticket: Ticket, file: &UploadFile) -> Result<HttpTransfer, TransportError> {
        let token = CancelToken::new();
        let cancel = token.clone();
        let spec = Arc::clone(&self.spec);
        let form_request = Arc::clone(&self.form_request);
        let events = self.events.clone();
        let file = file.clone();

        let task = self.runtime.spawn_blocking(move || {
            let result = form_request(&file)
                .map_err(|e| TransportError::Request(format!("{e:#}")))
                .and_then(|body| perform_upload(&spec, ticket, body, &events, &cancel));
            if cancel.is_cancelled() {
                tracing::debug!(file = %file.name(), "upload aborted; outcome suppressed");
                return;
            }
            if events
                .blocking_send(TransportEvent::Outcome { ticket, result })
                .is_err()
            {
                tracing::warn!(file = %file.name(), "event receiver dropped before upload outcome");
            }
        });

        Ok(HttpTransfer { token, _task: task })
    }
}

/// Runs one upload on the current thread. Call from `spawn_blocking`.
fn perform_upload(
    spec: &RequestSpec,
    ticket: Ticket,
    body: RequestBody,
    events: &EventSender,
    cancel: &CancelToken,
) -> Result<UploadResponse, TransportError> {
    let body_len = body.len();
    let mut payload = body.into_reader();
    let mut response = Vec::new();
    let mut last_reported = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(&spec.url)?;
    easy.post(true)?;
    easy.post_field_size(body_len)?;
    if spec.method != "POST" {
        easy.custom_request(&spec.method)?;
    }
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(spec.timeouts.connect)?;
    easy.timeout(spec.timeouts.total)?;
    easy.progress(true)?;

    let mut headers = curl::easy::List::new();
    headers.append(&format!("Content-Type: {}", spec.content_type.trim()))?;
    // Send the body straight away instead of waiting on 100-continue.
    headers.append("Expect:")?;
    easy.http_headers(headers)?;

    {
        let mut transfer = easy.transfer();
        transfer.read_function(|into| {
            payload
                .read(into)
                .map_err(|_| curl::easy::ReadError::Abort)
        })?;
        transfer.write_function(|data| {
            response.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.progress_function(|_dl_total, _dl_now, ul_total, ul_now| {
            if cancel.is_cancelled() {
                return false;
            }
            let (loaded, total) = (ul_now as u64, ul_total as u64);
            if total > 0 && last_reported != Some(loaded) {
                last_reported = Some(loaded);
                // Progress is best-effort; a full channel drops the frame.
                let _ = events.try_send(TransportEvent::Progress {
                    ticket,
                    loaded,
                    total,
                });
            }
            true
        })?;
        transfer.perform()?;
    }

    let status = easy.response_code()?;
    if !(200..300).contains(&status) {
        return Err(TransportError::Http {
            status,
            body: String::from_utf8_lossy(&response).into_owned(),
        });
    }
    Ok(UploadResponse {
        status,
        body: response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::event_channel;

    #[tokio::test]
    async fn builder_requires_url_and_former() {
        let (tx, _rx) = event_channel(4);
        let err = HttpTransport::builder(tx.clone())
            .form_request(raw_body)
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::MissingUrl);

        let err = HttpTransport::builder(tx.clone())
            .url("http://127.0.0.1:1/upload")
            .build()
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::MissingFormRequest);

        let err = HttpTransport::builder(tx.clone())
            .url("not a url")
            .form_request(raw_body)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));

        let transport = HttpTransport::builder(tx)
            .url("http://127.0.0.1:1/upload")
            .method("put")
            .form_request(raw_body)
            .build()
            .unwrap();
        assert_eq!(transport.method(), "PUT");
        assert_eq!(transport.url(), "http://127.0.0.1:1/upload");
    }

    #[test]
    fn builder_outside_runtime_fails() {
        let (tx, _rx) = event_channel(4);
        let err = HttpTransport::builder(tx)
            .url("http://127.0.0.1:1/upload")
            .form_request(raw_body)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::NoRuntime(_)));
    }

    fn read_all(body: RequestBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.into_reader().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn json_metadata_describes_file() {
        let file = UploadFile::from_bytes("a.png", vec![1u8, 2, 3]);
        let body = read_all(json_metadata(&file).unwrap());
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["name"], "a.png");
        assert_eq!(value["size"], 3);
        assert_eq!(read_all(raw_body(&file).unwrap()), vec![1u8, 2, 3]);
    }

    #[test]
    fn raw_body_streams_files_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, b"abcdef").unwrap();
        let file = UploadFile::from_path(&path).unwrap();

        let body = raw_body(&file).unwrap();
        assert!(matches!(body, RequestBody::File { len: 6, .. }));
        assert_eq!(body.len(), 6);
        assert_eq!(read_all(body), b"abcdef");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn create_does_not_wait_for_the_body_former() {
        let (tx, mut rx) = event_channel(4);
        let mut transport = HttpTransport::builder(tx)
            .url("http://127.0.0.1:1/upload")
            .form_request(|_: &UploadFile| {
                std::thread::sleep(Duration::from_millis(400));
                Err(anyhow::anyhow!("payload unavailable"))
            })
            .build()
            .unwrap();
        let file = UploadFile::from_bytes("slow.bin", vec![0u8; 8]);
        let ticket = Ticket {
            file: crate::file::FileId(7),
            dispatch: 0,
        };

        let started = std::time::Instant::now();
        let _handle = transport.create(ticket, &file).unwrap();
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "create took {:?}",
            started.elapsed()
        );

        // Former failures arrive as the dispatch outcome.
        match rx.recv().await.unwrap() {
            TransportEvent::Outcome { ticket: t, result } => {
                assert_eq!(t, ticket);
                match result {
                    Err(TransportError::Request(msg)) => {
                        assert!(msg.contains("payload unavailable"), "{msg}")
                    }
                    other => panic!("expected request error, got {other:?}"),
                }
            }
            other => panic!("expected outcome, got {other:?}"),
        }
    }
}
