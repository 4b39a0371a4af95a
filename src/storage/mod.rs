// drbackup/src/storage/mod.rs
pub(crate) mod download;
pub(crate) mod list;
pub(crate) mod upload;

pub use download::DownloadResult;
pub use list::{backup_prefix_for, ObjectInfo};
pub use upload::{backup_object_key, UploadResult};

use aws_sdk_s3 as s3;
use s3::config::Region;
use std::time::Duration;

use crate::config::ObjectStoreConfig;

/// Deadline applied to every remote transfer. Local work is never bounded.
pub(crate) const TRANSFER_TIMEOUT: Duration = Duration::from_secs(600);

/// Thin adapter over an S3-compatible object storage service. No retry or
/// backoff lives here; transient failures surface directly to the caller.
pub struct ObjectStoreClient {
    pub(crate) client: s3::Client,
    pub(crate) bucket_name: String,
    compartment_id: String,
}

impl ObjectStoreClient {
    pub async fn new(store_config: &ObjectStoreConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&store_config.endpoint_url)
            .region(Region::new(store_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &store_config.access_key_id,
                &store_config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        ObjectStoreClient {
            client: s3::Client::new(&sdk_config),
            bucket_name: store_config.bucket_name.clone(),
            compartment_id: store_config.compartment_id.clone(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn compartment_id(&self) -> &str {
        &self.compartment_id
    }
}
