use crate::config::UploadConfig;
use crate::error::EngineError;
use crate::models::{ResumedUpload, UploadDescriptor, UploadId};
use crate::services::descriptor_store::DescriptorStore;
use crate::services::events::UploadListener;
use crate::services::queue::{QueueEntry, WorkQueue};
use crate::services::remote::RemoteStore;
use crate::services::staging::StagedWriter;
use crate::services::transfer::{FixedDelay, RetryPolicy, TransferExecutor};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, Semaphore, watch};
use tokio::task::JoinHandle;

/// The persistent upload queue: durable intake, bounded concurrent
/// transfers, crash recovery.
///
/// One engine owns one staging root, one work queue and one concurrency
/// gate. [`start`](Self::start) launches the dispatcher; intake and recovery
/// may run before or after it.
pub struct UploadEngine {
    config: UploadConfig,
    store: Arc<DescriptorStore>,
    queue: Arc<WorkQueue>,
    gate: Arc<Semaphore>,
    pending: Arc<DashMap<UploadId, ()>>,
    listener: Arc<dyn UploadListener>,
    executor: Arc<TransferExecutor>,
    completions: watch::Receiver<()>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

struct Dispatcher {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl UploadEngine {
    pub fn new(
        config: UploadConfig,
        remote: Arc<dyn RemoteStore>,
        listener: Arc<dyn UploadListener>,
    ) -> Self {
        let retry = Arc::new(FixedDelay::new(config.retry_delay));
        Self::with_retry_policy(config, remote, listener, retry)
    }

    pub fn with_retry_policy(
        config: UploadConfig,
        remote: Arc<dyn RemoteStore>,
        listener: Arc<dyn UploadListener>,
        retry: Arc<dyn RetryPolicy>,
    ) -> Self {
        let store = Arc::new(DescriptorStore::new(&config.staging_root));
        let queue = Arc::new(WorkQueue::new());
        let gate = Arc::new(Semaphore::new(config.concurrent_uploads));
        let pending = Arc::new(DashMap::new());
        let (completions_tx, completions_rx) = watch::channel(());

        let executor = Arc::new(TransferExecutor::new(
            store.clone(),
            remote,
            listener.clone(),
            retry,
            queue.clone(),
            pending.clone(),
            completions_tx,
        ));

        Self {
            config,
            store,
            queue,
            gate,
            pending,
            listener,
            executor,
            completions: completions_rx,
            dispatcher: Mutex::new(None),
        }
    }

    // -- intake ----------------------------------------------------------

    /// Queue a freshly staged file for creation on the remote store. The
    /// descriptor is durable before this returns.
    pub async fn submit_new(
        &self,
        id: UploadId,
        path: impl Into<String>,
        parent_id: impl Into<String>,
        length: u64,
    ) -> Result<(), EngineError> {
        self.submit(UploadDescriptor {
            id,
            path: path.into(),
            parent_id: parent_id.into(),
            length,
            overwrite: false,
        })
        .await
    }

    /// Queue a staged file that replaces the existing remote object `id`.
    pub async fn submit_overwrite(
        &self,
        id: UploadId,
        path: impl Into<String>,
        parent_id: impl Into<String>,
        length: u64,
    ) -> Result<(), EngineError> {
        self.submit(UploadDescriptor {
            id,
            path: path.into(),
            parent_id: parent_id.into(),
            length,
            overwrite: true,
        })
        .await
    }

    async fn submit(&self, descriptor: UploadDescriptor) -> Result<(), EngineError> {
        if self.pending.contains_key(&descriptor.id) {
            return Err(EngineError::DuplicateDescriptor(descriptor.id.clone()));
        }

        self.store.create(&descriptor).await?;
        self.pending.insert(descriptor.id.clone(), ());
        tracing::info!(
            upload = %descriptor.id,
            path = %descriptor.path,
            overwrite = descriptor.overwrite,
            "upload queued"
        );
        self.queue.push(QueueEntry::new(descriptor));
        Ok(())
    }

    // -- staged writes ---------------------------------------------------

    /// Open a staged payload for writing; finishing the writer submits it
    /// as a new remote file.
    pub async fn stage_new(
        &self,
        id: UploadId,
        path: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Result<StagedWriter<'_>, EngineError> {
        self.stage(id, path.into(), parent_id.into(), false).await
    }

    /// Truncate the staged payload for `id` to zero length; finishing the
    /// writer submits it as an overwrite of the existing remote object.
    pub async fn stage_overwrite(
        &self,
        id: UploadId,
        path: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Result<StagedWriter<'_>, EngineError> {
        self.stage(id, path.into(), parent_id.into(), true).await
    }

    async fn stage(
        &self,
        id: UploadId,
        path: String,
        parent_id: String,
        overwrite: bool,
    ) -> Result<StagedWriter<'_>, EngineError> {
        if self.pending.contains_key(&id) {
            return Err(EngineError::DuplicateDescriptor(id));
        }

        fs::create_dir_all(self.store.root()).await?;
        // create() truncates, which is exactly the overwrite contract
        let file = fs::File::create(self.store.payload_path(&id)).await?;
        Ok(StagedWriter {
            engine: self,
            file,
            id,
            path,
            parent_id,
            overwrite,
            written: 0,
        })
    }

    // -- recovery --------------------------------------------------------

    /// Re-admit descriptors left under `root` by a previous run, oldest
    /// first. Each item is announced through `on_resumed` before it is
    /// queued. Returns the number of re-admitted items.
    pub async fn recover(&self, root: impl AsRef<Path>) -> Result<usize, EngineError> {
        self.store.set_root(root.as_ref());
        let descriptors = self.store.list_pending().await?;

        let mut admitted = 0;
        for descriptor in descriptors {
            if self.pending.contains_key(&descriptor.id) {
                tracing::warn!(upload = %descriptor.id, "skipping resumed record already pending");
                continue;
            }

            let resumed = ResumedUpload::from(&descriptor);
            self.listener.on_resumed(&resumed);
            self.pending.insert(descriptor.id.clone(), ());
            self.queue.push(QueueEntry::new(descriptor));
            admitted += 1;
        }

        tracing::info!(
            admitted,
            root = %self.store.root().display(),
            "recovery scan re-admitted pending uploads"
        );
        Ok(admitted)
    }

    // -- lifecycle -------------------------------------------------------

    /// Launch the dispatcher if it is not already running. Repeated calls
    /// are no-ops.
    pub async fn start(&self) {
        let mut slot = self.dispatcher.lock().await;
        if let Some(dispatcher) = slot.as_ref() {
            if !dispatcher.handle.is_finished() {
                tracing::debug!("dispatcher already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(dispatch_loop(
            self.queue.clone(),
            self.gate.clone(),
            self.executor.clone(),
            shutdown_rx,
        ));
        *slot = Some(Dispatcher {
            handle,
            shutdown: shutdown_tx,
        });
        tracing::info!(limit = self.config.concurrent_uploads, "upload dispatcher started");
    }

    /// Signal shutdown and wait for the dispatcher to exit at its next
    /// blocking point. In-flight transfers keep running to their natural
    /// end; they are not interrupted.
    pub async fn stop(&self) {
        let mut slot = self.dispatcher.lock().await;
        if let Some(dispatcher) = slot.take() {
            let _ = dispatcher.shutdown.send(true);
            if let Err(err) = dispatcher.handle.await {
                // shutdown-induced faults are expected and swallowed
                tracing::debug!(error = %err, "dispatcher join after shutdown");
            }
            tracing::info!("upload dispatcher stopped");
        }
    }

    /// Wait until the queue is empty and every concurrency slot has been
    /// returned. Items sitting out a retry delay hold neither and do not
    /// block drain.
    pub async fn drain(&self) {
        let mut completions = self.completions.clone();
        loop {
            completions.borrow_and_update();
            if self.queue.is_empty()
                && self.gate.available_permits() == self.config.concurrent_uploads
            {
                return;
            }
            if completions.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of uploads admitted but not yet terminally finished or failed.
    pub fn pending_uploads(&self) -> usize {
        self.pending.len()
    }
}

/// Single long-lived loop: pop, acquire a slot, launch the transfer without
/// waiting for it. Admission stays FIFO; completion order is unconstrained.
async fn dispatch_loop(
    queue: Arc<WorkQueue>,
    gate: Arc<Semaphore>,
    executor: Arc<TransferExecutor>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let entry = tokio::select! {
            _ = shutdown.changed() => break,
            entry = queue.recv() => entry,
        };

        let permit = tokio::select! {
            _ = shutdown.changed() => {
                // hand the popped entry back so a later start() still sees it
                queue.mark_dispatched();
                queue.push(entry);
                break;
            }
            permit = gate.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        queue.mark_dispatched();
        let executor = executor.clone();
        tokio::spawn(async move {
            if let Err(err) = executor.run(entry, permit).await {
                tracing::error!(error = %err, "upload task ended abnormally");
            }
        });
    }
    tracing::debug!("dispatcher loop exited");
}
