use crate::error::EngineError;
use crate::models::{FailureReason, UploadDescriptor, UploadId};
use crate::services::descriptor_store::DescriptorStore;
use crate::services::events::UploadListener;
use crate::services::queue::{QueueEntry, WorkQueue};
use crate::services::remote::{ContentSource, RemoteStore};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, watch};

/// Progress of a queue entry through one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    InFlight,
    Succeeded,
    PermanentlyFailed(FailureReason),
    RetryableFailed,
}

/// Decides how long to wait before re-admitting a failed entry.
///
/// Returning `None` abandons the item instead of re-queueing it; the default
/// policy never does.
pub trait RetryPolicy: Send + Sync {
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

/// Default policy: retry forever with the same delay between attempts.
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Drives one queue entry through the per-item state machine: transfer,
/// outcome classification, retry or terminal notification.
pub struct TransferExecutor {
    store: Arc<DescriptorStore>,
    remote: Arc<dyn RemoteStore>,
    listener: Arc<dyn UploadListener>,
    retry: Arc<dyn RetryPolicy>,
    queue: Arc<WorkQueue>,
    pending: Arc<DashMap<UploadId, ()>>,
    completions: watch::Sender<()>,
}

impl TransferExecutor {
    pub fn new(
        store: Arc<DescriptorStore>,
        remote: Arc<dyn RemoteStore>,
        listener: Arc<dyn UploadListener>,
        retry: Arc<dyn RetryPolicy>,
        queue: Arc<WorkQueue>,
        pending: Arc<DashMap<UploadId, ()>>,
        completions: watch::Sender<()>,
    ) -> Self {
        Self {
            store,
            remote,
            listener,
            retry,
            queue,
            pending,
            completions,
        }
    }

    /// Run one attempt to its natural end: success, permanent failure, or
    /// the start of the retry-delay wait. The concurrency slot is released
    /// in every branch before any delay; the returned error is the
    /// unexpected-condition signal the spawn wrapper logs.
    pub async fn run(
        self: Arc<Self>,
        mut entry: QueueEntry,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), EngineError> {
        entry.state = TransferState::InFlight;
        let outcome = self.attempt(&entry.descriptor).await;

        match outcome {
            Ok(TransferState::RetryableFailed) => {
                entry.state = TransferState::RetryableFailed;
                self.release(permit);
                entry.attempts += 1;
                match self.retry.next_delay(entry.attempts) {
                    Some(delay) => {
                        tokio::time::sleep(delay).await;
                        entry.state = TransferState::Pending;
                        self.queue.push(entry);
                    }
                    None => {
                        let id = entry.descriptor.id.clone();
                        tracing::warn!(upload = %id, attempts = entry.attempts, "retry policy gave up; dropping upload");
                        self.store.remove(&id).await?;
                        self.pending.remove(&id);
                    }
                }
                Ok(())
            }
            Ok(state) => {
                entry.state = state;
                self.release(permit);
                Ok(())
            }
            Err(err) => {
                self.pending.remove(&entry.descriptor.id);
                self.release(permit);
                Err(err)
            }
        }
    }

    fn release(&self, permit: OwnedSemaphorePermit) {
        drop(permit);
        let _ = self.completions.send(());
    }

    /// Settle the item's durable and in-memory state, then notify. The
    /// descriptor and pending entry are gone before any hook fires, so a
    /// listener reacting to the outcome can immediately submit the same id
    /// again.
    async fn settle(&self, id: &UploadId) -> Result<(), EngineError> {
        self.store.remove(id).await?;
        self.pending.remove(id);
        Ok(())
    }

    async fn attempt(&self, descriptor: &UploadDescriptor) -> Result<TransferState, EngineError> {
        if descriptor.length == 0 {
            self.settle(&descriptor.id).await?;
            tracing::warn!(upload = %descriptor.id, path = %descriptor.path, "rejecting zero-length staged file");
            self.listener.on_failed(descriptor, FailureReason::ZeroLength);
            return Ok(TransferState::PermanentlyFailed(FailureReason::ZeroLength));
        }

        let source = ContentSource {
            path: self.store.payload_path(&descriptor.id),
            length: descriptor.length,
        };
        let sent = if descriptor.overwrite {
            self.remote.overwrite(descriptor.id.as_str(), source).await
        } else {
            self.remote
                .create_new(&descriptor.parent_id, descriptor.name(), source)
                .await
        };

        match sent {
            Ok(Some(node)) => {
                self.settle(&descriptor.id).await?;
                tracing::info!(upload = %descriptor.id, remote = %node.id, "upload finished");
                self.listener.on_finished(descriptor, &node);
                Ok(TransferState::Succeeded)
            }
            Ok(None) => {
                self.settle(&descriptor.id).await?;
                self.listener.on_failed(descriptor, FailureReason::NoNode);
                Err(EngineError::MissingRemoteNode(descriptor.id.clone()))
            }
            Err(err) if err.is_conflict() => self.resolve_conflict(descriptor).await,
            Err(err) => {
                tracing::warn!(upload = %descriptor.id, error = %err, "transfer failed, will retry");
                Ok(TransferState::RetryableFailed)
            }
        }
    }

    /// The target already exists remotely. If the existing child is visible,
    /// the previous attempt most likely landed and only the confirmation was
    /// lost; take it as the result.
    async fn resolve_conflict(
        &self,
        descriptor: &UploadDescriptor,
    ) -> Result<TransferState, EngineError> {
        match self
            .remote
            .lookup_child(&descriptor.parent_id, descriptor.name())
            .await
        {
            Ok(Some(node)) => {
                self.settle(&descriptor.id).await?;
                tracing::info!(upload = %descriptor.id, remote = %node.id, "conflict resolved to existing remote node");
                self.listener.on_finished(descriptor, &node);
                Ok(TransferState::Succeeded)
            }
            Ok(None) => {
                self.settle(&descriptor.id).await?;
                self.listener.on_failed(descriptor, FailureReason::Conflict);
                Ok(TransferState::PermanentlyFailed(FailureReason::Conflict))
            }
            Err(err) => {
                tracing::warn!(upload = %descriptor.id, error = %err, "conflict lookup failed, will retry");
                Ok(TransferState::RetryableFailed)
            }
        }
    }
}
