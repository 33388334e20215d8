#![allow(dead_code)]

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use rust_upload_queue::config::UploadConfig;
use rust_upload_queue::models::{FailureReason, ResumedUpload, UploadDescriptor};
use rust_upload_queue::services::events::UploadListener;
use rust_upload_queue::services::remote::{ContentSource, RemoteError, RemoteNode, RemoteStore};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Scripted outcome for one transfer attempt against the mock store.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Succeed,
    NoNode,
    Conflict,
    Transport,
}

/// Scripted outcome for a conflict-resolution lookup.
#[derive(Debug, Clone, Copy)]
pub enum LookupScript {
    Found,
    Absent,
    Fail,
}

/// Remote store double: scripted per-name outcomes, concurrency accounting,
/// and an optional gate so tests can hold transfers in flight.
pub struct MockRemote {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    lookups: Mutex<HashMap<String, LookupScript>>,
    /// Names in the order their transfers started.
    pub starts: Mutex<Vec<String>>,
    /// Source lengths in the order their transfers started.
    pub lengths: Mutex<Vec<u64>>,
    current: AtomicUsize,
    pub max_concurrent: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    release: Option<Arc<Semaphore>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            lookups: Mutex::new(HashMap::new()),
            starts: Mutex::new(Vec::new()),
            lengths: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            release: None,
        }
    }

    /// A mock whose transfers block until the test adds permits to `gate`.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        let mut mock = Self::new();
        mock.release = Some(gate);
        mock
    }

    /// Queue outcomes for transfers of `name`; once exhausted, transfers
    /// succeed.
    pub fn script(&self, name: &str, outcomes: impl IntoIterator<Item = Script>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), outcomes.into_iter().collect());
    }

    pub fn lookup_script(&self, name: &str, outcome: LookupScript) {
        self.lookups.lock().unwrap().insert(name.to_string(), outcome);
    }

    pub fn started(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    fn node(name: &str, size: u64) -> RemoteNode {
        RemoteNode {
            id: format!("remote-{name}"),
            name: name.to_string(),
            size: Some(size as i64),
            modified_at: Some(Utc::now()),
        }
    }

    async fn transfer(&self, name: &str, source: &ContentSource) -> Result<Option<RemoteNode>, RemoteError> {
        self.starts.lock().unwrap().push(name.to_string());
        self.lengths.lock().unwrap().push(source.length);
        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.release {
            gate.acquire().await.unwrap().forget();
        }

        self.current.fetch_sub(1, Ordering::SeqCst);
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Script::Succeed);

        match outcome {
            Script::Succeed => Ok(Some(Self::node(name, source.length))),
            Script::NoNode => Ok(None),
            Script::Conflict => Err(RemoteError::Conflict(name.to_string())),
            Script::Transport => Err(RemoteError::Transport(anyhow!("simulated outage"))),
        }
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn create_new(
        &self,
        _parent_id: &str,
        name: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        self.transfer(name, &source).await
    }

    async fn overwrite(
        &self,
        id: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        self.transfer(id, &source).await
    }

    async fn lookup_child(
        &self,
        _parent_id: &str,
        name: &str,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        let outcome = self
            .lookups
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(LookupScript::Absent);
        match outcome {
            LookupScript::Found => Ok(Some(Self::node(name, 0))),
            LookupScript::Absent => Ok(None),
            LookupScript::Fail => Err(RemoteError::Transport(anyhow!("lookup outage"))),
        }
    }
}

/// Listener double recording every notification.
#[derive(Default)]
pub struct RecordingListener {
    pub finished: Mutex<Vec<(String, String)>>,
    pub failed: Mutex<Vec<(String, FailureReason)>>,
    pub resumed: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn finished_paths(&self) -> Vec<String> {
        self.finished.lock().unwrap().iter().map(|(path, _)| path.clone()).collect()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.lock().unwrap().len()
    }

    pub fn failures(&self) -> Vec<(String, FailureReason)> {
        self.failed.lock().unwrap().clone()
    }

    pub fn resumed_paths(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }
}

impl UploadListener for RecordingListener {
    fn on_finished(&self, descriptor: &UploadDescriptor, node: &RemoteNode) {
        self.finished
            .lock()
            .unwrap()
            .push((descriptor.path.clone(), node.id.clone()));
    }

    fn on_failed(&self, descriptor: &UploadDescriptor, reason: FailureReason) {
        self.failed
            .lock()
            .unwrap()
            .push((descriptor.path.clone(), reason));
    }

    fn on_resumed(&self, resumed: &ResumedUpload) {
        self.resumed.lock().unwrap().push(resumed.path.clone());
    }
}

pub fn test_config(root: &Path, limit: usize) -> UploadConfig {
    UploadConfig {
        concurrent_uploads: limit,
        retry_delay: Duration::from_millis(20),
        staging_root: root.to_path_buf(),
    }
}

/// Write a staged payload where the engine expects it.
pub async fn stage_payload(root: &Path, id: &str, bytes: &[u8]) {
    tokio::fs::create_dir_all(root).await.unwrap();
    tokio::fs::write(root.join(id), bytes).await.unwrap();
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let start = Instant::now();
    while !condition() {
        if start.elapsed() > Duration::from_secs(5) {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
