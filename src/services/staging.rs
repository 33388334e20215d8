use crate::error::EngineError;
use crate::models::UploadId;
use crate::services::engine::UploadEngine;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Write handle over a staged payload.
///
/// Obtained from [`UploadEngine::stage_new`] or
/// [`UploadEngine::stage_overwrite`]; bytes written here land in the staging
/// directory, and [`finish`](Self::finish) hands the file to the queue. A
/// writer that is dropped without finishing leaves the payload staged but
/// never submits it.
pub struct StagedWriter<'a> {
    pub(crate) engine: &'a UploadEngine,
    pub(crate) file: File,
    pub(crate) id: UploadId,
    pub(crate) path: String,
    pub(crate) parent_id: String,
    pub(crate) overwrite: bool,
    pub(crate) written: u64,
}

impl StagedWriter<'_> {
    pub fn id(&self) -> &UploadId {
        &self.id
    }

    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        self.file.write_all(buf).await?;
        self.written += buf.len() as u64;
        Ok(())
    }

    /// Sync the staged bytes and submit the upload. This is the close step:
    /// after it returns, the descriptor is durable and the item is queued.
    pub async fn finish(self) -> Result<UploadId, EngineError> {
        self.file.sync_all().await?;
        drop(self.file);

        if self.overwrite {
            self.engine
                .submit_overwrite(self.id.clone(), self.path, self.parent_id, self.written)
                .await?;
        } else {
            self.engine
                .submit_new(self.id.clone(), self.path, self.parent_id, self.written)
                .await?;
        }
        Ok(self.id)
    }
}
