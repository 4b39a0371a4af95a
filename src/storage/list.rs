// drbackup/src/storage/list.rs
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::timeout;

use super::ObjectStoreClient;
use crate::errors::{AppError, Result};

const LIST_TIMEOUT: Duration = Duration::from_secs(120);

/// Summary of one remote object.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: String,
}

/// Key prefix for all backups of one calendar month.
pub fn backup_prefix_for(year: i32, month: u32) -> String {
    format!("backups/{}/{:02}/", year, month)
}

impl ObjectStoreClient {
    /// Lists objects under a key prefix.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket_name)
            .prefix(prefix);

        let response = timeout(LIST_TIMEOUT, request.send())
            .await
            .map_err(|_| AppError::Transfer(format!("listing prefix {:?} timed out", prefix)))?
            .map_err(|e| {
                AppError::Transfer(format!(
                    "failed to list objects with prefix {:?} in bucket {}: {}",
                    prefix, self.bucket_name, e
                ))
            })?;

        let objects = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?.to_string();
                Some(ObjectInfo {
                    key,
                    size: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|ts| DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())),
                    etag: object.e_tag().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(objects)
    }

    /// Lists every backup artifact in the bucket.
    pub async fn list_backups(&self) -> Result<Vec<ObjectInfo>> {
        self.list_objects("backups/").await
    }

    /// Lists the backups of one calendar month.
    pub async fn list_backups_by_date(&self, year: i32, month: u32) -> Result<Vec<ObjectInfo>> {
        self.list_objects(&backup_prefix_for(year, month)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backup_object_key;
    use chrono::TimeZone;

    #[test]
    fn test_month_prefix_is_zero_padded() {
        assert_eq!(backup_prefix_for(2025, 12), "backups/2025/12/");
        assert_eq!(backup_prefix_for(2026, 3), "backups/2026/03/");
    }

    #[test]
    fn test_month_prefix_selects_exactly_one_month() {
        let prefix = backup_prefix_for(2025, 12);

        let december = backup_object_key(
            Utc.with_ymd_and_hms(2025, 12, 9, 0, 0, 0).unwrap(),
            "backup-20251209.tar.gz",
        );
        let november = backup_object_key(
            Utc.with_ymd_and_hms(2025, 11, 9, 0, 0, 0).unwrap(),
            "backup-20251109.tar.gz",
        );
        let next_december = backup_object_key(
            Utc.with_ymd_and_hms(2026, 12, 9, 0, 0, 0).unwrap(),
            "backup-20261209.tar.gz",
        );

        assert!(december.starts_with(&prefix));
        assert!(!november.starts_with(&prefix));
        assert!(!next_december.starts_with(&prefix));
    }
}
