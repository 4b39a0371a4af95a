// drbackup/src/storage/download.rs
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use super::{ObjectStoreClient, TRANSFER_TIMEOUT};
use crate::errors::{AppError, Result};

/// Information about a downloaded object.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub object_key: String,
    pub local_path: PathBuf,
    pub size: u64,
    pub duration: Duration,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectStoreClient {
    /// Streams a remote object to a local file. A missing key is `NotFound`;
    /// every other service failure is `Transfer`.
    pub async fn download_file(&self, object_key: &str, destination_path: &Path) -> Result<DownloadResult> {
        let started = Instant::now();

        if let Some(parent) = destination_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(object_key);

        let response = timeout(TRANSFER_TIMEOUT, request.send())
            .await
            .map_err(|_| AppError::Transfer(format!("download of {} timed out", object_key)))?;

        let mut object = match response {
            Ok(object) => object,
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|service_err| service_err.is_no_such_key())
                {
                    return Err(AppError::NotFound(object_key.to_string()));
                }
                return Err(AppError::Transfer(format!(
                    "failed to get object {} from bucket {}: {}",
                    object_key, self.bucket_name, err
                )));
            }
        };

        let last_modified = object
            .last_modified()
            .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos()));

        let mut output_file = File::create(destination_path).await?;
        let mut total_bytes: u64 = 0;
        while let Some(chunk) = object.body.try_next().await.map_err(|e| {
            AppError::Transfer(format!("failed to read body of object {}: {}", object_key, e))
        })? {
            output_file.write_all(&chunk).await?;
            total_bytes += chunk.len() as u64;
        }
        output_file.flush().await?;

        Ok(DownloadResult {
            object_key: object_key.to_string(),
            local_path: destination_path.to_path_buf(),
            size: total_bytes,
            duration: started.elapsed(),
            last_modified,
        })
    }
}
