// drbackup/src/restore/logic.rs
use std::fs;
use std::path::Path;

use crate::backup::archive;
use crate::config::PostgresConfig;
use crate::encryption;
use crate::errors::{AppError, Result};
use crate::restore::db_restore::Restorer;

/// Restores a database from a backup artifact: decrypt if the `.encrypted`
/// marker is present, extract the embedded SQL dump into a scoped temporary
/// directory, then hand the dump to the restore tool.
///
/// The extraction directory is removed on every exit path. A decrypted
/// intermediate produced here is removed as well, so no plaintext copy of an
/// encrypted artifact outlives the run.
pub fn run_restore(
    restorer: &dyn Restorer,
    config: &PostgresConfig,
    artifact_path: &Path,
    target_db: Option<&str>,
    encryption_key: Option<&str>,
) -> Result<()> {
    if !artifact_path.exists() {
        return Err(AppError::Validation(format!(
            "backup file not found: {}",
            artifact_path.display()
        )));
    }

    let mut decrypted_path = None;
    let archive_path = if encryption::is_encrypted(artifact_path) {
        let key = encryption_key.ok_or(AppError::MissingKey)?;
        println!("🔓 Decrypting backup...");
        let plain = encryption::decrypt_file(artifact_path, key)?;
        decrypted_path = Some(plain.clone());
        plain
    } else {
        artifact_path.to_path_buf()
    };

    let result = extract_and_restore(restorer, config, &archive_path, target_db);

    if let Some(plain) = decrypted_path {
        let _ = fs::remove_file(plain);
    }

    result
}

fn extract_and_restore(
    restorer: &dyn Restorer,
    config: &PostgresConfig,
    archive_path: &Path,
    target_db: Option<&str>,
) -> Result<()> {
    // Dropped on every exit path, which removes the directory.
    let extract_dir = tempfile::Builder::new().prefix("drbackup-restore-").tempdir()?;

    println!("📂 Extracting archive {}...", archive_path.display());
    let sql_path = archive::extract_single_file(archive_path, extract_dir.path())?;

    let database = target_db.unwrap_or(&config.database);
    println!("🔄 Restoring into database '{}'...", database);
    restorer.restore(config, &sql_path, target_db)
}
