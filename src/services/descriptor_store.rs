use crate::error::EngineError;
use crate::models::{UploadDescriptor, UploadId};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Suffix distinguishing descriptor records from the co-located byte
/// payloads, which carry no suffix and are named by id alone.
pub const DESCRIPTOR_SUFFIX: &str = ".descriptor";

/// Writes and removes the durable records describing pending uploads.
///
/// A record exists on disk exactly as long as work for that id is
/// outstanding; removal happens only on terminal success or permanent
/// failure.
pub struct DescriptorStore {
    root: RwLock<PathBuf>,
}

impl DescriptorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: RwLock::new(root.into()),
        }
    }

    pub fn root(&self) -> PathBuf {
        self.root
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Re-point the store at a new staging root. Records under the previous
    /// root are no longer visible to the store.
    pub fn set_root(&self, root: impl Into<PathBuf>) {
        let mut guard = self
            .root
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = root.into();
    }

    pub fn descriptor_path(&self, id: &UploadId) -> PathBuf {
        self.root().join(format!("{}{}", id, DESCRIPTOR_SUFFIX))
    }

    pub fn payload_path(&self, id: &UploadId) -> PathBuf {
        self.root().join(id.as_str())
    }

    /// Persist a record durably. Returns [`EngineError::DuplicateDescriptor`]
    /// if a record for this id already exists.
    ///
    /// The record is written to a temporary file, synced, and renamed into
    /// place, so a crash leaves either the full record or none.
    pub async fn create(&self, descriptor: &UploadDescriptor) -> Result<(), EngineError> {
        let path = self.descriptor_path(&descriptor.id);
        if fs::try_exists(&path).await? {
            return Err(EngineError::DuplicateDescriptor(descriptor.id.clone()));
        }

        let root = self.root();
        fs::create_dir_all(&root).await?;

        let tmp = root.join(format!("{}{}.tmp", descriptor.id, DESCRIPTOR_SUFFIX));
        let record = serde_json::to_vec(descriptor)?;
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&record).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Remove the record for `id`. Missing records are fine; removal is the
    /// terminal step and may race a crashed prior run.
    pub async fn remove(&self, id: &UploadId) -> Result<(), EngineError> {
        match fs::remove_file(self.descriptor_path(id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// List all pending records under the root, ordered by record creation
    /// time ascending so re-admission preserves original intake order.
    ///
    /// Malformed or unreadable records are skipped and logged rather than
    /// aborting the scan.
    pub async fn list_pending(&self) -> Result<Vec<UploadDescriptor>, EngineError> {
        let root = self.root();
        let mut dir = match fs::read_dir(&root).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut found: Vec<(SystemTime, String, UploadDescriptor)> = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(DESCRIPTOR_SUFFIX) {
                continue;
            }

            let record = match fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(record = %name, error = %err, "skipping unreadable descriptor record");
                    continue;
                }
            };
            let descriptor: UploadDescriptor = match serde_json::from_slice(&record) {
                Ok(descriptor) => descriptor,
                Err(err) => {
                    tracing::warn!(record = %name, error = %err, "skipping malformed descriptor record");
                    continue;
                }
            };

            let meta = entry.metadata().await?;
            // Not every filesystem reports a birth time; modification time of
            // a write-once record is equivalent.
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            found.push((created, name, descriptor));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        Ok(found.into_iter().map(|(_, _, descriptor)| descriptor).collect())
    }
}
