use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Handle to an object that exists on the remote store.
#[derive(Debug, Clone)]
pub struct RemoteNode {
    pub id: String,
    pub name: String,
    pub size: Option<i64>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Staged payload handed to the transport, addressed by path so
/// implementations can stream it instead of buffering it whole.
#[derive(Debug, Clone)]
pub struct ContentSource {
    pub path: PathBuf,
    pub length: u64,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    /// The target already exists remotely.
    #[error("remote target already exists: {0}")]
    Conflict(String),

    /// Any other transport or server failure.
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

impl RemoteError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict(_))
    }
}

/// The remote transfer collaborator consumed by the queue.
///
/// Any operation may return `Ok(None)` when the provider reports success
/// without handing back a node; the executor treats that as a failure.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create `name` under `parent_id` from the staged payload.
    async fn create_new(
        &self,
        parent_id: &str,
        name: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError>;

    /// Replace the content of the existing remote object `id`.
    async fn overwrite(
        &self,
        id: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError>;

    /// Find a direct child of `parent_id` by name.
    async fn lookup_child(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<RemoteNode>, RemoteError>;
}

/// Remote store backed by S3-compatible object storage.
///
/// Container ids are key prefixes; a node id is the full object key.
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
}

impl S3RemoteStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn child_key(parent_id: &str, name: &str) -> String {
        if parent_id.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", parent_id.trim_end_matches('/'), name)
        }
    }

    fn leaf(key: &str) -> &str {
        key.rsplit('/').next().unwrap_or(key)
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    async fn create_new(
        &self,
        parent_id: &str,
        name: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        let key = Self::child_key(parent_id, name);
        let body = ByteStream::from_path(&source.path)
            .await
            .map_err(|err| RemoteError::Transport(anyhow!("staged payload unreadable: {err}")))?;

        // If-None-Match turns "already exists" into a 412 so the caller can
        // run its conflict resolution instead of silently clobbering.
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .if_none_match("*")
            .body(body)
            .send()
            .await;

        match res {
            Ok(_) => Ok(Some(RemoteNode {
                id: key.clone(),
                name: name.to_string(),
                size: Some(source.length as i64),
                modified_at: Some(Utc::now()),
            })),
            Err(err) if err.code() == Some("PreconditionFailed") => {
                Err(RemoteError::Conflict(key))
            }
            Err(err) => Err(RemoteError::Transport(err.into())),
        }
    }

    async fn overwrite(
        &self,
        id: &str,
        source: ContentSource,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        let body = ByteStream::from_path(&source.path)
            .await
            .map_err(|err| RemoteError::Transport(anyhow!("staged payload unreadable: {err}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(id)
            .body(body)
            .send()
            .await
            .map_err(|err| RemoteError::Transport(err.into()))?;

        Ok(Some(RemoteNode {
            id: id.to_string(),
            name: Self::leaf(id).to_string(),
            size: Some(source.length as i64),
            modified_at: Some(Utc::now()),
        }))
    }

    async fn lookup_child(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<RemoteNode>, RemoteError> {
        let key = Self::child_key(parent_id, name);
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await;

        match res {
            Ok(head) => {
                let modified_at = head.last_modified.and_then(|d| {
                    DateTime::from_timestamp(d.secs(), d.subsec_nanos())
                });
                Ok(Some(RemoteNode {
                    id: key,
                    name: name.to_string(),
                    size: head.content_length,
                    modified_at,
                }))
            }
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_not_found() {
                    Ok(None)
                } else {
                    Err(RemoteError::Transport(anyhow!(service_error)))
                }
            }
        }
    }
}
