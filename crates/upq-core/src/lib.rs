pub mod config;
pub mod logging;

pub mod cancel;
pub mod file;
pub mod scheduler;
pub mod session;
pub mod transport;
pub mod validate;

pub use file::{FileId, FileRecord, FileState, UploadFile};
pub use scheduler::{UploadHooks, UploadScheduler, UploadStatus};
pub use session::{SessionCommand, UploadSession};
