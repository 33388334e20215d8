//! Persistent, crash-recoverable upload queue.
//!
//! Staged files are described by small durable records written next to their
//! byte payloads; a single dispatcher feeds them to a bounded pool of
//! concurrent transfers against a [`services::remote::RemoteStore`]. After a
//! restart, [`services::engine::UploadEngine::recover`] replays undelivered
//! work from the records left on disk, in original intake order.

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;

pub use config::UploadConfig;
pub use error::EngineError;
pub use models::{FailureReason, ResumedUpload, UploadDescriptor, UploadId};
pub use services::engine::UploadEngine;
pub use services::events::UploadListener;
pub use services::remote::{ContentSource, RemoteError, RemoteNode, RemoteStore};
pub use services::staging::StagedWriter;
pub use services::transfer::{FixedDelay, RetryPolicy, TransferState};
