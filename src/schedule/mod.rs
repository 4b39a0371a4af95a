// drbackup/src/schedule/mod.rs
//
// YAML-defined backup schedules deployed straight to the user's crontab.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::process::{Command, Stdio};
use which::which;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub schedule: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Example schedule with the common daily/weekly/monthly patterns.
pub fn example_schedule() -> ScheduleConfig {
    let mut env = BTreeMap::new();
    env.insert(
        "BACKUP_ENCRYPTION_KEY".to_string(),
        "your-encryption-key-here".to_string(),
    );

    ScheduleConfig {
        jobs: vec![
            Job {
                name: "daily-backup".to_string(),
                schedule: "0 0 * * *".to_string(),
                command: "/usr/local/bin/drbackup backup --name prod-db --db-name myapp --db-host localhost --db-user postgres --encrypt".to_string(),
                env: env.clone(),
            },
            Job {
                name: "weekly-backup".to_string(),
                schedule: "0 3 * * 0".to_string(),
                command: "/usr/local/bin/drbackup backup --name prod-db-weekly --db-name myapp --db-host localhost --db-user postgres --encrypt".to_string(),
                env: env.clone(),
            },
            Job {
                name: "monthly-backup".to_string(),
                schedule: "0 2 1 * *".to_string(),
                command: "/usr/local/bin/drbackup backup --name prod-db-monthly --db-name myapp --db-host localhost --db-user postgres --encrypt".to_string(),
                env,
            },
        ],
    }
}

pub fn write_example(output_path: &Path) -> Result<()> {
    let rendered = serde_yaml::to_string(&example_schedule())
        .map_err(|e| AppError::Config(format!("failed to serialize schedule: {}", e)))?;
    fs::write(output_path, rendered)?;
    Ok(())
}

pub fn load(path: &Path) -> Result<ScheduleConfig> {
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("failed to parse {}: {}", path.display(), e)))
}

/// Checks every job for a usable name, command and cron expression.
pub fn validate(config: &ScheduleConfig) -> Result<()> {
    if config.jobs.is_empty() {
        return Err(AppError::Validation("schedule contains no jobs".to_string()));
    }
    for job in &config.jobs {
        if job.name.trim().is_empty() {
            return Err(AppError::Validation("job name cannot be empty".to_string()));
        }
        if job.command.trim().is_empty() {
            return Err(AppError::Validation(format!(
                "job '{}' has an empty command",
                job.name
            )));
        }
        validate_cron_expression(&job.schedule).map_err(|e| {
            AppError::Validation(format!("job '{}': {}", job.name, e))
        })?;
    }
    Ok(())
}

/// Light sanity check for a 5-field cron expression; the real parse belongs
/// to cron itself.
pub fn validate_cron_expression(expr: &str) -> Result<()> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(AppError::Validation(format!(
            "cron expression {:?} must have 5 fields, found {}",
            expr,
            fields.len()
        )));
    }
    for field in fields {
        let valid = field
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | '/' | ',' | '-'));
        if !valid {
            return Err(AppError::Validation(format!(
                "cron expression {:?} has an invalid field {:?}",
                expr, field
            )));
        }
    }
    Ok(())
}

/// Renders a crontab fragment. Environment variables are inlined per job so
/// two jobs with different keys never clash.
pub fn render_crontab(config: &ScheduleConfig) -> String {
    let mut out = String::new();
    for job in &config.jobs {
        let _ = writeln!(out, "# {}", job.name);
        let mut env_prefix = String::new();
        for (key, value) in &job.env {
            let _ = write!(env_prefix, "{}={} ", key, value);
        }
        let _ = writeln!(out, "{} {}{}", job.schedule, env_prefix, job.command);
    }
    out
}

/// Validates and deploys a schedule to the system crontab via `crontab -`.
pub fn deploy(config: &ScheduleConfig, dry_run: bool) -> Result<()> {
    validate(config)?;
    let rendered = render_crontab(config);

    if dry_run {
        println!("🔎 Dry-run mode, crontab that would be installed:\n");
        println!("{}", rendered);
        return Ok(());
    }

    let crontab_path = which("crontab")
        .map_err(|_| AppError::Config("crontab executable not found in PATH".to_string()))?;

    let mut child = Command::new(crontab_path)
        .arg("-")
        .stdin(Stdio::piped())
        .spawn()?;
    child
        .stdin
        .take()
        .ok_or_else(|| AppError::Config("failed to open crontab stdin".to_string()))?
        .write_all(rendered.as_bytes())?;

    let status = child.wait()?;
    if !status.success() {
        return Err(AppError::Config(format!(
            "crontab deployment failed with status: {}",
            status
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_schedule_round_trips_through_yaml() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("backup-schedule.yaml");

        write_example(&path)?;
        let loaded = load(&path)?;

        assert_eq!(loaded, example_schedule());
        validate(&loaded)?;
        Ok(())
    }

    #[test]
    fn test_cron_expression_field_count() {
        assert!(validate_cron_expression("0 3 * * 0").is_ok());
        assert!(validate_cron_expression("*/15 * * * *").is_ok());
        assert!(matches!(
            validate_cron_expression("0 3 * *"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_cron_expression("0 3 * * 0 extra"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_cron_expression_rejects_stray_characters() {
        assert!(matches!(
            validate_cron_expression("0 3 * * mon"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_schedule() {
        let config = ScheduleConfig { jobs: Vec::new() };
        assert!(matches!(validate(&config), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_render_crontab_inlines_env() {
        let mut env = BTreeMap::new();
        env.insert("KEY".to_string(), "value".to_string());
        let config = ScheduleConfig {
            jobs: vec![Job {
                name: "nightly".to_string(),
                schedule: "0 1 * * *".to_string(),
                command: "drbackup backup --name nightly".to_string(),
                env,
            }],
        };

        let rendered = render_crontab(&config);
        assert!(rendered.contains("# nightly"));
        assert!(rendered.contains("0 1 * * * KEY=value drbackup backup --name nightly"));
    }
}
