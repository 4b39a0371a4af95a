// drbackup/src/backup/db_dump.rs
use std::path::{Path, PathBuf};
use std::process::Command;
use which::which;

use crate::config::PostgresConfig;
use crate::errors::{AppError, Result};

// Helper function to find the pg_dump executable
fn find_pg_dump_executable() -> Result<PathBuf> {
    which("pg_dump").map_err(|_| {
        AppError::Config(
            "pg_dump executable not found in PATH. Please ensure PostgreSQL client tools are installed and in your PATH."
                .to_string(),
        )
    })
}

/// Capability interface for producing a database dump, so tests can
/// substitute a fake without a real PostgreSQL client binary.
pub trait Dumper {
    fn dump(&self, config: &PostgresConfig, output_path: &Path) -> Result<()>;
}

/// Dumps via the `pg_dump` command-line tool. Connection parameters travel as
/// arguments; the password only ever enters the child's environment.
pub struct PgDump;

impl Dumper for PgDump {
    fn dump(&self, config: &PostgresConfig, output_path: &Path) -> Result<()> {
        let pg_dump_path = find_pg_dump_executable()?;

        let mut cmd = Command::new(pg_dump_path);
        cmd.arg("-h")
            .arg(&config.host)
            .arg("-p")
            .arg(config.port.to_string())
            .arg("-U")
            .arg(&config.user)
            .arg("-d")
            .arg(&config.database)
            .arg("-f")
            .arg(output_path)
            .arg("--format=plain");
        if !config.password.is_empty() {
            cmd.env("PGPASSWORD", &config.password);
        }

        let output = cmd
            .output()
            .map_err(|e| AppError::Dump(format!("failed to execute pg_dump: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Dump(format!(
                "pg_dump for database {} failed with status: {}\nStderr: {}",
                config.database,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}
