//! Success and failure callbacks run when an upload resolves.

use crate::config::ConfigError;
use crate::file::FileRecord;
use crate::transport::{TransportError, UploadResponse};

pub type SuccessCallback = Box<dyn FnMut(&UploadResponse, &FileRecord) + Send>;
pub type FailureCallback = Box<dyn FnMut(&TransportError, &FileRecord) + Send>;

/// Both callbacks are required; see [`UploadHooks::builder`].
pub struct UploadHooks {
    on_success: SuccessCallback,
    on_failure: FailureCallback,
}

impl UploadHooks {
    pub fn new<S, F>(on_success: S, on_failure: F) -> Self
    where
        S: FnMut(&UploadResponse, &FileRecord) + Send + 'static,
        F: FnMut(&TransportError, &FileRecord) + Send + 'static,
    {
        Self {
            on_success: Box::new(on_success),
            on_failure: Box::new(on_failure),
        }
    }

    pub fn builder() -> UploadHooksBuilder {
        UploadHooksBuilder::default()
    }

    pub(crate) fn succeeded(&mut self, response: &UploadResponse, record: &FileRecord) {
        (self.on_success)(response, record)
    }

    pub(crate) fn failed(&mut self, error: &TransportError, record: &FileRecord) {
        (self.on_failure)(error, record)
    }
}

#[derive(Default)]
pub struct UploadHooksBuilder {
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

impl UploadHooksBuilder {
    pub fn on_success<S>(mut self, f: S) -> Self
    where
        S: FnMut(&UploadResponse, &FileRecord) + Send + 'static,
    {
        self.on_success = Some(Box::new(f));
        self
    }

    pub fn on_failure<F>(mut self, f: F) -> Self
    where
        F: FnMut(&TransportError, &FileRecord) + Send + 'static,
    {
        self.on_failure = Some(Box::new(f));
        self
    }

    pub fn build(self) -> Result<UploadHooks, ConfigError> {
        Ok(UploadHooks {
            on_success: self.on_success.ok_or(ConfigError::MissingSuccessCallback)?,
            on_failure: self.on_failure.ok_or(ConfigError::MissingFailureCallback)?,
        })
    }
}
