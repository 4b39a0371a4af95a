// drbackup/src/storage/upload.rs
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Datelike, Utc};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::{ObjectStoreClient, TRANSFER_TIMEOUT};
use crate::errors::{AppError, Result};

/// Information about an uploaded object.
#[derive(Debug, Clone)]
pub struct UploadResult {
    pub object_key: String,
    pub bucket: String,
    pub size: u64,
    pub duration: Duration,
    pub etag: String,
}

/// Computes the date-partitioned object key for a backup artifact:
/// `backups/<year>/<zero-padded month>/<filename>`. Lexical order of keys is
/// chronological within a bucket, which the list filters rely on.
pub fn backup_object_key(now: DateTime<Utc>, filename: &str) -> String {
    format!("backups/{}/{:02}/{}", now.year(), now.month(), filename)
}

impl ObjectStoreClient {
    /// Uploads a local file. When no explicit key is given the key is derived
    /// from the wall clock at call time via [`backup_object_key`]. The
    /// content length is declared up front; there is no multi-part path.
    pub async fn upload_file(&self, local_path: &Path, object_key: Option<&str>) -> Result<UploadResult> {
        let started = Instant::now();

        let metadata = tokio::fs::metadata(local_path).await?;
        let file_name = local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::Validation(format!("invalid file path: {}", local_path.display()))
            })?;
        let object_key = match object_key {
            Some(key) => key.to_string(),
            None => backup_object_key(Utc::now(), &file_name),
        };

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            AppError::Transfer(format!(
                "failed to open {} for upload: {}",
                local_path.display(),
                e
            ))
        })?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&object_key)
            .content_length(metadata.len() as i64)
            .body(body);

        let response = timeout(TRANSFER_TIMEOUT, request.send())
            .await
            .map_err(|_| AppError::Transfer(format!("upload of {} timed out", object_key)))?
            .map_err(|e| {
                AppError::Transfer(format!(
                    "failed to upload {} to bucket {}: {}",
                    object_key, self.bucket_name, e
                ))
            })?;

        Ok(UploadResult {
            object_key,
            bucket: self.bucket_name.clone(),
            size: metadata.len(),
            duration: started.elapsed(),
            etag: response.e_tag().unwrap_or_default().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_object_key_is_date_partitioned() {
        let now = Utc.with_ymd_and_hms(2025, 12, 9, 14, 30, 0).unwrap();
        assert_eq!(
            backup_object_key(now, "backup-20251209.tar.gz"),
            "backups/2025/12/backup-20251209.tar.gz"
        );
    }

    #[test]
    fn test_backup_object_key_zero_pads_the_month() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            backup_object_key(now, "weekly.tar.gz.encrypted"),
            "backups/2026/03/weekly.tar.gz.encrypted"
        );
    }

    #[test]
    fn test_keys_sort_chronologically() {
        let january = backup_object_key(Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(), "a");
        let november = backup_object_key(Utc.with_ymd_and_hms(2025, 11, 5, 0, 0, 0).unwrap(), "a");
        let december = backup_object_key(Utc.with_ymd_and_hms(2025, 12, 5, 0, 0, 0).unwrap(), "a");
        assert!(november < december);
        assert!(december < january);
    }
}
