use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the upload queue
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum number of concurrent transfers (default: 4)
    pub concurrent_uploads: usize,

    /// Delay before a failed transfer is re-admitted (default: 10s)
    pub retry_delay: Duration,

    /// Directory holding staged payloads and their descriptors
    pub staging_root: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrent_uploads: 4,
            retry_delay: Duration::from_secs(10),
            staging_root: PathBuf::from("./staging"),
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            concurrent_uploads: env::var("UPLOAD_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(|v: usize| v.max(1))
                .unwrap_or(default.concurrent_uploads),

            retry_delay: env::var("UPLOAD_RETRY_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.retry_delay),

            staging_root: env::var("UPLOAD_STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.staging_root),
        }
    }
}
