// drbackup/src/backup/logic.rs
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::backup::archive;
use crate::backup::db_dump::Dumper;
use crate::config::PostgresConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    Database,
    FileSet,
}

/// The single compressed (and possibly later encrypted) file produced by a
/// backup run, plus what it took to produce it. Immutable once returned; the
/// caller owns the file from here on.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub kind: BackupKind,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub local_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub duration: Duration,
    pub files_included: u64,
    pub encrypted: bool,
}

/// Space saved as a fraction. An empty input compresses to nothing by
/// definition, not to a division fault.
pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    1.0 - compressed_size as f64 / original_size as f64
}

/// Dumps a single PostgreSQL database and archives the dump.
///
/// The run is strictly sequential: dump, stat, archive, stat, delete the
/// plain dump. A failure at any step removes whatever the failing step wrote,
/// so a failed run never leaves a `.tar.gz` that looks like a valid artifact
/// or an uncompressed dump lying around.
pub fn run_database_backup(
    dumper: &dyn Dumper,
    config: &PostgresConfig,
    backup_name: &str,
    output_dir: &Path,
) -> Result<BackupArtifact> {
    let started = Instant::now();
    let created_at = Utc::now();

    fs::create_dir_all(output_dir)?;

    let timestamp = created_at.format("%Y%m%d-%H%M%S");
    let dump_path = output_dir.join(format!("{}-{}.sql", backup_name, timestamp));
    let archive_path = output_dir.join(format!("{}-{}.tar.gz", backup_name, timestamp));

    println!("🐘 Dumping PostgreSQL database '{}'...", config.database);
    if let Err(e) = dumper.dump(config, &dump_path) {
        let _ = fs::remove_file(&dump_path);
        return Err(e);
    }

    let original_size = fs::metadata(&dump_path)?.len();
    println!(
        "Dump created: {} ({:.2} MB)",
        dump_path.display(),
        original_size as f64 / 1024.0 / 1024.0
    );

    println!("🗜 Compressing to {}...", archive_path.display());
    if let Err(e) = archive::archive_file(&dump_path, &archive_path) {
        let _ = fs::remove_file(&archive_path);
        let _ = fs::remove_file(&dump_path);
        return Err(e);
    }

    let compressed_size = match fs::metadata(&archive_path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            let _ = fs::remove_file(&archive_path);
            let _ = fs::remove_file(&dump_path);
            return Err(AppError::Io(e));
        }
    };

    // Compressed artifact confirmed written and statted; drop the plain dump.
    let _ = fs::remove_file(&dump_path);

    Ok(BackupArtifact {
        kind: BackupKind::Database,
        name: backup_name.to_string(),
        created_at,
        local_path: archive_path,
        original_size,
        compressed_size,
        compression_ratio: compression_ratio(original_size, compressed_size),
        duration: started.elapsed(),
        files_included: 1,
        encrypted: false,
    })
}

/// Archives a set of files/directories with exclude rules.
///
/// All sources are validated before anything is written, so a typoed path
/// fails fast instead of after minutes of archiving.
pub fn run_fileset_backup(
    sources: &[PathBuf],
    exclude_patterns: &[String],
    backup_name: &str,
    output_dir: &Path,
) -> Result<BackupArtifact> {
    if sources.is_empty() {
        return Err(AppError::Validation("no sources specified for backup".to_string()));
    }
    for source in sources {
        if !source.exists() {
            return Err(AppError::Validation(format!(
                "source does not exist: {}",
                source.display()
            )));
        }
    }

    let started = Instant::now();
    let created_at = Utc::now();

    fs::create_dir_all(output_dir)?;

    let timestamp = created_at.format("%Y%m%d-%H%M%S");
    let archive_path = output_dir.join(format!("{}-{}.tar.gz", backup_name, timestamp));

    println!("📦 Archiving {} source(s) to {}...", sources.len(), archive_path.display());
    let stats = match archive::build_archive(sources, exclude_patterns, &archive_path) {
        Ok(stats) => stats,
        Err(e) => {
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }
    };

    let compressed_size = match fs::metadata(&archive_path) {
        Ok(meta) => meta.len(),
        Err(e) => {
            let _ = fs::remove_file(&archive_path);
            return Err(AppError::Io(e));
        }
    };

    Ok(BackupArtifact {
        kind: BackupKind::FileSet,
        name: backup_name.to_string(),
        created_at,
        local_path: archive_path,
        original_size: stats.total_bytes,
        compressed_size,
        compression_ratio: compression_ratio(stats.total_bytes, compressed_size),
        duration: started.elapsed(),
        files_included: stats.file_count,
        encrypted: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    struct FakeDumper {
        content: &'static [u8],
    }

    impl Dumper for FakeDumper {
        fn dump(&self, _config: &PostgresConfig, output_path: &Path) -> crate::errors::Result<()> {
            fs::write(output_path, self.content)?;
            Ok(())
        }
    }

    struct FailingDumper;

    impl Dumper for FailingDumper {
        fn dump(&self, _config: &PostgresConfig, output_path: &Path) -> crate::errors::Result<()> {
            // Simulate pg_dump dying after it already opened its output file.
            fs::write(output_path, b"partial")?;
            Err(AppError::Dump("pg_dump exited with status 1".to_string()))
        }
    }

    fn test_pg_config() -> PostgresConfig {
        PostgresConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "secret".to_string(),
            database: "appdb".to_string(),
        }
    }

    fn tar_gz_files_in(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|entry| {
                let path = entry.unwrap().path();
                path.to_string_lossy().ends_with(".tar.gz").then_some(path)
            })
            .collect()
    }

    #[test]
    fn test_database_backup_produces_artifact_and_removes_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dumper = FakeDumper {
            content: b"-- PostgreSQL database dump\nCREATE TABLE t (id int);\n",
        };

        let artifact = run_database_backup(&dumper, &test_pg_config(), "appdb", dir.path())?;

        assert_eq!(artifact.kind, BackupKind::Database);
        assert!(artifact.local_path.exists());
        assert_eq!(artifact.original_size, dumper.content.len() as u64);
        assert_eq!(artifact.files_included, 1);
        assert!(!artifact.encrypted);

        // The uncompressed dump must be gone.
        let leftover_sql: Vec<_> = fs::read_dir(dir.path())?
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "sql")
            })
            .collect();
        assert!(leftover_sql.is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_dump_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();

        let result = run_database_backup(&FailingDumper, &test_pg_config(), "appdb", dir.path());

        assert!(matches!(result, Err(AppError::Dump(_))));
        assert!(tar_gz_files_in(dir.path()).is_empty());
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert!(remaining.is_empty(), "failed run left files behind: {:?}", remaining);
    }

    #[test]
    fn test_fileset_backup_validates_sources_first() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");

        let result = run_fileset_backup(&[missing.clone()], &[], "files", dir.path());

        match result {
            Err(AppError::Validation(msg)) => assert!(msg.contains("nope")),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(tar_gz_files_in(dir.path()).is_empty());
    }

    #[test]
    fn test_fileset_backup_reports_stats() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("data");
        fs::create_dir(&source)?;
        fs::write(source.join("a.txt"), vec![b'a'; 4096])?;
        fs::write(source.join("b.txt"), vec![b'b'; 2048])?;

        let output_dir = dir.path().join("out");
        let artifact = run_fileset_backup(&[source], &[], "files", &output_dir)?;

        assert_eq!(artifact.kind, BackupKind::FileSet);
        assert_eq!(artifact.files_included, 2);
        assert_eq!(artifact.original_size, 6144);
        assert!(artifact.compressed_size > 0);
        assert!(artifact.compression_ratio > 0.0);
        Ok(())
    }

    #[test]
    fn test_compression_ratio_of_empty_input_is_zero() {
        assert_eq!(compression_ratio(0, 0), 0.0);
        assert_eq!(compression_ratio(0, 128), 0.0);
        assert!((compression_ratio(1000, 250) - 0.75).abs() < f64::EPSILON);
    }
}
