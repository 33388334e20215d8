use crate::models::{FailureReason, ResumedUpload, UploadDescriptor};
use crate::services::remote::RemoteNode;

/// Notification hooks the filesystem layer registers to observe upload
/// outcomes.
///
/// Each hook is invoked synchronously on whichever worker task completes the
/// item, so implementations must tolerate concurrent calls. Retryable
/// failures are absorbed internally and never reach `on_failed`.
pub trait UploadListener: Send + Sync {
    /// The staged file was delivered; `node` is the resulting remote object.
    fn on_finished(&self, descriptor: &UploadDescriptor, node: &RemoteNode);

    /// The upload failed permanently and will not be retried.
    fn on_failed(&self, descriptor: &UploadDescriptor, reason: FailureReason);

    /// A descriptor from a previous run was found on disk and re-admitted.
    fn on_resumed(&self, resumed: &ResumedUpload);
}

/// Listener that only logs. Used by the runner binary, where there is no
/// filesystem layer to notify.
pub struct LoggingListener;

impl UploadListener for LoggingListener {
    fn on_finished(&self, descriptor: &UploadDescriptor, node: &RemoteNode) {
        tracing::info!(upload = %descriptor.id, path = %descriptor.path, remote = %node.id, "upload finished");
    }

    fn on_failed(&self, descriptor: &UploadDescriptor, reason: FailureReason) {
        tracing::warn!(upload = %descriptor.id, path = %descriptor.path, %reason, "upload failed");
    }

    fn on_resumed(&self, resumed: &ResumedUpload) {
        tracing::info!(upload = %resumed.id, path = %resumed.path, length = resumed.length, "upload resumed");
    }
}
