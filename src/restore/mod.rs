pub(crate) mod db_restore;
mod logic;

pub use db_restore::{PsqlRestore, Restorer};
pub use logic::run_restore;

use anyhow::{Context, Result};
use std::io::{stdin, stdout, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{ObjectStoreConfig, PostgresConfig};
use crate::errors::AppError;
use crate::metrics::{MetricsSink, Operation};
use crate::storage::ObjectStoreClient;

/// Everything a single restore run needs, assembled by the CLI layer.
/// Exactly one of `local_file` and `from_cloud` must be set.
#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub database: PostgresConfig,
    pub local_file: Option<PathBuf>,
    pub from_cloud: Option<String>,
    pub target_db: Option<String>,
    pub encryption_key: Option<String>,
    pub store: Option<ObjectStoreConfig>,
    pub skip_confirm: bool,
}

/// Public entry point for the restore process. A remote artifact is first
/// downloaded into a scoped temporary directory that is removed when the run
/// ends, whatever the outcome.
pub async fn run_restore_flow(
    restorer: &dyn Restorer,
    request: &RestoreRequest,
    sink: &MetricsSink,
) -> Result<()> {
    let (_download_dir, artifact_path) = match (&request.local_file, &request.from_cloud) {
        (Some(path), None) => (None, path.clone()),
        (None, Some(object_key)) => {
            let store = request.store.as_ref().ok_or_else(|| {
                AppError::Validation(
                    "--bucket and --compartment are required when using --from-cloud".to_string(),
                )
            })?;

            println!("📥 Downloading backup from object storage...");
            println!("   Bucket: {}", store.bucket_name);
            println!("   Object: {}", object_key);

            let client = ObjectStoreClient::new(store).await;
            let temp_dir = tempfile::Builder::new().prefix("drbackup-restore-").tempdir()?;
            let file_name = Path::new(object_key).file_name().ok_or_else(|| {
                AppError::Validation(format!("invalid object key: {}", object_key))
            })?;
            let local_path = temp_dir.path().join(file_name);

            match client.download_file(object_key, &local_path).await {
                Ok(result) => {
                    sink.record_success(Operation::Download, result.duration);
                    println!("✅ Downloaded to: {}\n", local_path.display());
                }
                Err(e) => {
                    sink.record_failure(Operation::Download, e.failure_reason());
                    return Err(e).context("failed to download backup");
                }
            }

            (Some(temp_dir), local_path)
        }
        (None, None) => {
            return Err(AppError::Validation(
                "either --file or --from-cloud must be specified".to_string(),
            )
            .into());
        }
        (Some(_), Some(_)) => {
            return Err(AppError::Validation(
                "cannot specify both --file and --from-cloud".to_string(),
            )
            .into());
        }
    };

    let database = request.target_db.as_deref().unwrap_or(&request.database.database);
    println!("🔄 Restore plan:");
    println!("   Backup file: {}", artifact_path.display());
    println!("   Target host: {}:{}", request.database.host, request.database.port);
    println!("   Target database: {}", database);
    println!();

    if !request.skip_confirm {
        if !confirm_overwrite(database)? {
            println!("❌ Restore cancelled.");
            return Ok(());
        }
        println!();
    }

    let started = Instant::now();
    match logic::run_restore(
        restorer,
        &request.database,
        &artifact_path,
        request.target_db.as_deref(),
        request.encryption_key.as_deref(),
    ) {
        Ok(()) => {
            sink.record_success(Operation::Restore, started.elapsed());
            println!("🎉 Restore completed successfully");
            Ok(())
        }
        Err(e) => {
            sink.record_failure(Operation::Restore, e.failure_reason());
            Err(e).context("restore failed")
        }
    }
}

/// Asks the operator to type `yes` before a database is overwritten.
fn confirm_overwrite(database: &str) -> Result<bool> {
    println!("⚠️  WARNING: this will overwrite the database '{}'!", database);
    print!("Are you sure you want to continue? (yes/no): ");
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read confirmation")?;
    let answer = input.trim().to_lowercase();
    Ok(answer == "yes" || answer == "y")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct NoopRestorer;

    impl Restorer for NoopRestorer {
        fn restore(
            &self,
            _config: &PostgresConfig,
            _sql_file: &Path,
            _target_db: Option<&str>,
        ) -> crate::errors::Result<()> {
            Ok(())
        }
    }

    fn base_request() -> RestoreRequest {
        RestoreRequest {
            database: PostgresConfig {
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: String::new(),
                database: "appdb".to_string(),
            },
            local_file: None,
            from_cloud: None,
            target_db: None,
            encryption_key: None,
            store: None,
            skip_confirm: true,
        }
    }

    #[tokio::test]
    async fn test_local_and_cloud_sources_are_mutually_exclusive() {
        let sink = MetricsSink::new();
        let mut request = base_request();
        request.local_file = Some(PathBuf::from("backup.tar.gz"));
        request.from_cloud = Some("backups/2025/12/backup.tar.gz".to_string());

        let result = run_restore_flow(&NoopRestorer, &request, &sink).await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("cannot specify both"));
    }

    #[tokio::test]
    async fn test_neither_source_is_a_validation_error() {
        let sink = MetricsSink::new();
        let result = run_restore_flow(&NoopRestorer, &base_request(), &sink).await;
        let message = result.unwrap_err().to_string();
        assert!(message.contains("either --file or --from-cloud"));
    }

    #[tokio::test]
    async fn test_local_restore_records_metrics() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump_path = dir.path().join("appdb.sql");
        fs::write(&dump_path, b"SELECT 1;\n")?;
        let archive_path = dir.path().join("appdb.tar.gz");
        crate::backup::archive::archive_file(&dump_path, &archive_path)?;

        let sink = MetricsSink::new();
        let mut request = base_request();
        request.local_file = Some(archive_path);

        run_restore_flow(&NoopRestorer, &request, &sink).await?;
        assert_eq!(sink.success_total(Operation::Restore), 1);
        Ok(())
    }
}
