use crate::models::UploadId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("descriptor record error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Duplicate intake for an id that is already pending. Signals a bug in
    /// the intake layer, not a runtime condition to recover from.
    #[error("a descriptor for upload {0} already exists")]
    DuplicateDescriptor(UploadId),

    /// The remote store reported success but handed back no node.
    #[error("remote store returned no node for upload {0}")]
    MissingRemoteNode(UploadId),
}
