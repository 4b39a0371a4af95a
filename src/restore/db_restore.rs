// drbackup/src/restore/db_restore.rs
use std::path::{Path, PathBuf};
use std::process::Command;
use which::which;

use crate::config::PostgresConfig;
use crate::errors::{AppError, Result};

/// Finds the psql executable in the system PATH.
fn find_psql_executable() -> Result<PathBuf> {
    which("psql").map_err(|_| {
        AppError::Config(
            "psql executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH."
                .to_string(),
        )
    })
}

/// Capability interface for applying a SQL dump to a database, so tests can
/// substitute a fake without a real PostgreSQL client binary.
pub trait Restorer {
    fn restore(&self, config: &PostgresConfig, sql_file: &Path, target_db: Option<&str>) -> Result<()>;
}

/// Restores via the `psql` command-line tool. `ON_ERROR_STOP` makes a single
/// failing statement abort the run instead of silently producing a half
/// restored database.
pub struct PsqlRestore;

impl Restorer for PsqlRestore {
    fn restore(&self, config: &PostgresConfig, sql_file: &Path, target_db: Option<&str>) -> Result<()> {
        if !sql_file.exists() {
            return Err(AppError::RestoreTool(format!(
                "SQL file for restoration not found: {}",
                sql_file.display()
            )));
        }

        let psql_path = find_psql_executable()?;
        let database = target_db.unwrap_or(&config.database);

        let mut cmd = Command::new(psql_path);
        cmd.arg("-X") // Do not read psqlrc
            .arg("-q") // Quiet mode
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-h")
            .arg(&config.host)
            .arg("-p")
            .arg(config.port.to_string())
            .arg("-U")
            .arg(&config.user)
            .arg("-d")
            .arg(database)
            .arg("-f")
            .arg(sql_file);
        if !config.password.is_empty() {
            cmd.env("PGPASSWORD", &config.password);
        }

        let output = cmd
            .output()
            .map_err(|e| AppError::RestoreTool(format!("failed to execute psql: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::RestoreTool(format!(
                "psql restore into database {} failed with status: {}\nStderr: {}",
                database,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}
