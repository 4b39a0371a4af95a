pub(crate) mod archive;
pub(crate) mod db_dump;
mod logic;

pub use archive::{build_archive, extract_single_file, ArchiveStats};
pub use db_dump::{Dumper, PgDump};
pub use logic::{compression_ratio, run_database_backup, run_fileset_backup, BackupArtifact, BackupKind};

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::PostgresConfig;
use crate::encryption;
use crate::errors::AppError;
use crate::metrics::{MetricsSink, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupSource {
    Postgres,
    Files,
}

/// Everything a single backup run needs, assembled by the CLI layer.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub source: BackupSource,
    pub name: String,
    pub database: Option<PostgresConfig>,
    pub sources: Vec<PathBuf>,
    pub exclude_patterns: Vec<String>,
    pub output_dir: PathBuf,
    pub encrypt: bool,
    pub encryption_key: Option<String>,
}

/// Public entry point for the backup process: produce the artifact, record
/// metrics and health, then apply the optional encryption step. After a
/// successful encryption the plaintext archive is removed so only the
/// envelope remains on disk.
pub fn run_backup_flow(
    dumper: &dyn Dumper,
    request: &BackupRequest,
    sink: &MetricsSink,
) -> Result<BackupArtifact> {
    let started = Instant::now();

    if request.encrypt && request.encryption_key.is_none() {
        sink.record_failure(Operation::Backup, "missing_encryption_key");
        return Err(AppError::MissingKey).context("encryption key required when --encrypt is enabled");
    }

    println!("🚀 Starting backup: {}", request.name);

    let result = match request.source {
        BackupSource::Postgres => {
            let config = request.database.as_ref().ok_or_else(|| {
                AppError::Validation("database connection parameters are required for postgres backups".to_string())
            })?;
            logic::run_database_backup(dumper, config, &request.name, &request.output_dir)
        }
        BackupSource::Files => logic::run_fileset_backup(
            &request.sources,
            &request.exclude_patterns,
            &request.name,
            &request.output_dir,
        ),
    };

    let mut artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            sink.record_failure(Operation::Backup, e.failure_reason());
            sink.record_backup_error(&e.to_string());
            return Err(e).context("backup failed");
        }
    };

    sink.record_success(Operation::Backup, started.elapsed());
    sink.observe_backup_size(artifact.compressed_size);
    sink.record_backup_success();

    if request.encrypt {
        if let Some(key) = request.encryption_key.as_deref() {
            println!("🔐 Encrypting backup...");
            let encrypted_path = match encryption::encrypt_file(&artifact.local_path, key) {
                Ok(path) => path,
                Err(e) => {
                    sink.record_failure(Operation::Backup, e.failure_reason());
                    return Err(e).context("encryption failed");
                }
            };
            if let Err(e) = fs::remove_file(&artifact.local_path) {
                eprintln!("⚠️ Warning: failed to remove unencrypted file: {}", e);
            }
            artifact.local_path = encrypted_path;
            artifact.encrypted = true;
            println!("✅ Backup encrypted");
        }
    }

    println!("\n📦 Backup file: {}", artifact.local_path.display());
    println!("   Created: {}", artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   Original size: {:.2} MB", artifact.original_size as f64 / 1024.0 / 1024.0);
    println!(
        "   Compressed size: {:.2} MB ({:.1}% space saved)",
        artifact.compressed_size as f64 / 1024.0 / 1024.0,
        artifact.compression_ratio * 100.0
    );
    if artifact.kind == BackupKind::FileSet {
        println!("   Files included: {}", artifact.files_included);
    }
    println!("⏱  Duration: {:.2}s", artifact.duration.as_secs_f64());

    Ok(artifact)
}
