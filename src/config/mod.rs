// drbackup/src/config/mod.rs
use std::env;

use crate::errors::{AppError, Result};

/// Connection parameters for the PostgreSQL server being backed up or
/// restored. The password is never placed on a command line; it is handed to
/// the client tools through the `PGPASSWORD` environment variable of the
/// spawned subprocess only.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Connection settings for the S3-compatible object storage service.
///
/// Bucket and compartment come from the CLI; endpoint, region and credentials
/// come from the environment so they never show up in shell history.
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub compartment_id: String,
}

impl ObjectStoreConfig {
    pub fn from_env(bucket_name: &str, compartment_id: &str) -> Result<Self> {
        if bucket_name.trim().is_empty() {
            return Err(AppError::Validation("bucket name cannot be empty".to_string()));
        }

        Ok(ObjectStoreConfig {
            endpoint_url: require_env("OBJECT_STORE_ENDPOINT")?,
            region: require_env("OBJECT_STORE_REGION")?,
            access_key_id: require_env("OBJECT_STORE_ACCESS_KEY_ID")?,
            secret_access_key: require_env("OBJECT_STORE_SECRET_ACCESS_KEY")?,
            bucket_name: bucket_name.to_string(),
            compartment_id: compartment_id.to_string(),
        })
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Config(format!("{} must be set in the environment", name)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env_rejects_empty_bucket() {
        let result = ObjectStoreConfig::from_env("", "compartment-1");
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
