use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of one staged file.
///
/// Used verbatim as the staged file name on disk, so caller-supplied ids must
/// be filesystem-safe; [`UploadId::generate`] produces UUID-based ids that
/// always are.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable record describing one pending upload.
///
/// Serialized verbatim to `<staging_root>/<id>.descriptor`; the staged bytes
/// live next to it under `<staging_root>/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadDescriptor {
    pub id: UploadId,
    /// Remote-facing name or path of the file.
    pub path: String,
    /// Remote container the file is created under.
    pub parent_id: String,
    /// Size of the staged payload in bytes.
    pub length: u64,
    /// Replace an existing remote object instead of creating a new one.
    pub overwrite: bool,
}

impl UploadDescriptor {
    /// Leaf name used when creating or looking up the remote child.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Logical view of an item re-admitted from disk after a restart, handed to
/// the filesystem layer so it can mark the file as in-flight rather than
/// missing.
#[derive(Debug, Clone)]
pub struct ResumedUpload {
    pub id: UploadId,
    pub path: String,
    pub length: u64,
    pub overwrite: bool,
}

impl From<&UploadDescriptor> for ResumedUpload {
    fn from(descriptor: &UploadDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            path: descriptor.path.clone(),
            length: descriptor.length,
            overwrite: descriptor.overwrite,
        }
    }
}

/// Why an upload failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The staged payload was empty; nothing was sent.
    ZeroLength,
    /// The remote store reported success but returned no node.
    NoNode,
    /// The target already exists remotely and could not be resolved to it.
    Conflict,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FailureReason::ZeroLength => "zero-length",
            FailureReason::NoNode => "no-node",
            FailureReason::Conflict => "conflict",
        };
        f.write_str(reason)
    }
}
