//! Disaster-recovery backup/restore tool
//!
//! Dumps PostgreSQL databases (or file sets), compresses and optionally
//! encrypts the artifact, and moves it to/from S3-compatible object storage
//! under a date-partitioned key scheme.

// drbackup/src/main.rs
mod backup;
mod config;
mod encryption;
mod errors;
mod metrics;
mod restore;
mod schedule;
mod storage;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::config::{ObjectStoreConfig, PostgresConfig};
use crate::metrics::{MetricsSink, Operation};
use crate::storage::ObjectStoreClient;

#[derive(Parser)]
#[command(
    name = "drbackup",
    version,
    about = "Disaster-recovery backup and restore tool",
    long_about = "A disaster recovery tool that manages backups of PostgreSQL databases\nand file sets, storing them securely in object storage."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a backup of a PostgreSQL database or a set of files
    Backup(BackupArgs),
    /// Upload a backup file to object storage
    Upload(UploadArgs),
    /// Download a backup file from object storage
    Download(DownloadArgs),
    /// Restore a PostgreSQL database from a backup archive
    Restore(RestoreArgs),
    /// List backup files stored in the bucket
    List(ListArgs),
    /// Generate a new 256-bit encryption key
    Keygen,
    /// Serve Prometheus metrics and the health endpoint over HTTP
    Serve(ServeArgs),
    /// Manage automated backup schedules
    Schedule(ScheduleArgs),
}

#[derive(Args)]
struct DbArgs {
    /// PostgreSQL host
    #[arg(long = "db-host", default_value = "localhost")]
    db_host: String,
    /// PostgreSQL port
    #[arg(long = "db-port", default_value_t = 5432)]
    db_port: u16,
    /// PostgreSQL user
    #[arg(long = "db-user", default_value = "postgres")]
    db_user: String,
    /// PostgreSQL password (handed to client tools via PGPASSWORD only)
    #[arg(long = "db-password", default_value = "")]
    db_password: String,
    /// PostgreSQL database name
    #[arg(long = "db-name")]
    db_name: Option<String>,
}

impl DbArgs {
    fn to_postgres_config(&self) -> Result<PostgresConfig> {
        let database = self.db_name.clone().context("--db-name is required")?;
        Ok(PostgresConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database,
        })
    }
}

#[derive(Args)]
struct StoreArgs {
    /// Object storage bucket name
    #[arg(long)]
    bucket: String,
    /// Compartment identifier the bucket lives in
    #[arg(long)]
    compartment: String,
}

#[derive(Args)]
struct BackupArgs {
    /// Backup source type
    #[arg(long, default_value = "postgres", value_parser = ["postgres", "files"])]
    source: String,
    /// Backup name used in artifact filenames
    #[arg(long)]
    name: String,
    #[command(flatten)]
    db: DbArgs,
    /// Output directory for backup artifacts
    #[arg(long, default_value = "./backups")]
    output: PathBuf,
    /// File or directory to include (repeatable, files source only)
    #[arg(long = "sources", value_name = "PATH")]
    sources: Vec<PathBuf>,
    /// Glob pattern to exclude (repeatable, files source only)
    #[arg(long = "exclude", value_name = "PATTERN")]
    exclude: Vec<String>,
    /// Encrypt the backup artifact
    #[arg(long)]
    encrypt: bool,
    /// Encryption key (or use the BACKUP_ENCRYPTION_KEY environment variable)
    #[arg(long = "encryption-key")]
    encryption_key: Option<String>,
}

#[derive(Args)]
struct UploadArgs {
    /// Path to the backup file to upload
    #[arg(long)]
    file: PathBuf,
    /// Custom object key (optional, defaults to backups/YYYY/MM/filename)
    #[arg(long = "object-name")]
    object_name: Option<String>,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct DownloadArgs {
    /// Object key to download
    #[arg(long)]
    object: String,
    /// Local path to save the downloaded file
    #[arg(long)]
    output: PathBuf,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct RestoreArgs {
    /// Local backup file path (.tar.gz or .tar.gz.encrypted)
    #[arg(long)]
    file: Option<PathBuf>,
    /// Download the backup from object storage first (object key in bucket)
    #[arg(long = "from-cloud")]
    from_cloud: Option<String>,
    #[command(flatten)]
    db: DbArgs,
    /// Target database name (if different from the dumped database)
    #[arg(long = "target-db")]
    target_db: Option<String>,
    /// Encryption key for encrypted artifacts (or BACKUP_ENCRYPTION_KEY)
    #[arg(long = "encryption-key")]
    encryption_key: Option<String>,
    /// Object storage bucket name (required with --from-cloud)
    #[arg(long)]
    bucket: Option<String>,
    /// Compartment identifier (required with --from-cloud)
    #[arg(long)]
    compartment: Option<String>,
    /// Skip the confirmation prompt
    #[arg(long = "yes")]
    skip_confirm: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Filter backups by year
    #[arg(long)]
    year: Option<i32>,
    /// Filter backups by month (requires --year)
    #[arg(long)]
    month: Option<u32>,
    /// List all objects in the bucket, not just backups
    #[arg(long)]
    all: bool,
    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    address: String,
    /// Port to listen on
    #[arg(long, default_value_t = 9090)]
    port: u16,
}

#[derive(Args)]
struct ScheduleArgs {
    #[command(subcommand)]
    command: ScheduleCommands,
}

#[derive(Subcommand)]
enum ScheduleCommands {
    /// Generate an example backup schedule YAML file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "backup-schedule.yaml")]
        output: PathBuf,
    },
    /// Validate a backup schedule YAML file
    Validate {
        /// Path to the schedule YAML file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Deploy a backup schedule to the system crontab
    Deploy {
        /// Path to the schedule YAML file
        #[arg(short, long)]
        file: PathBuf,
        /// Preview the crontab without deploying
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let sink = Arc::new(MetricsSink::new());

    match cli.command {
        Commands::Backup(args) => run_backup(&args, &sink),
        Commands::Upload(args) => run_upload(&args, &sink).await,
        Commands::Download(args) => run_download(&args, &sink).await,
        Commands::Restore(args) => run_restore(&args, &sink).await,
        Commands::List(args) => run_list(&args).await,
        Commands::Keygen => run_keygen(),
        Commands::Serve(args) => run_serve(&args, sink.clone()).await,
        Commands::Schedule(args) => run_schedule(&args),
    }
}

fn run_backup(args: &BackupArgs, sink: &MetricsSink) -> Result<()> {
    let (source, database) = match args.source.as_str() {
        "postgres" => {
            let config = args
                .db
                .to_postgres_config()
                .context("--db-name is required for postgres backups")?;
            (backup::BackupSource::Postgres, Some(config))
        }
        "files" => (backup::BackupSource::Files, None),
        other => anyhow::bail!("unsupported backup source: {}", other),
    };

    let request = backup::BackupRequest {
        source,
        name: args.name.clone(),
        database,
        sources: args.sources.clone(),
        exclude_patterns: args.exclude.clone(),
        output_dir: args.output.clone(),
        encrypt: args.encrypt,
        encryption_key: resolve_encryption_key(args.encryption_key.as_deref()),
    };

    backup::run_backup_flow(&backup::PgDump, &request, sink)?;
    Ok(())
}

async fn run_upload(args: &UploadArgs, sink: &MetricsSink) -> Result<()> {
    if !args.file.exists() {
        anyhow::bail!("file does not exist: {}", args.file.display());
    }

    let store_config = ObjectStoreConfig::from_env(&args.store.bucket, &args.store.compartment)?;
    println!("🔗 Connecting to object storage...");
    let client = ObjectStoreClient::new(&store_config).await;
    println!("✓ Connected (compartment: {})", client.compartment_id());
    println!("📤 Uploading file: {}", args.file.display());

    match client.upload_file(&args.file, args.object_name.as_deref()).await {
        Ok(result) => {
            sink.record_success(Operation::Upload, result.duration);
            println!("\n✅ Upload successful!");
            println!("  Object: {}", result.object_key);
            println!("  Bucket: {}", result.bucket);
            println!("  Size: {:.2} MB", result.size as f64 / 1024.0 / 1024.0);
            println!("  Duration: {:.2}s", result.duration.as_secs_f64());
            println!("  ETag: {}", result.etag);
            Ok(())
        }
        Err(e) => {
            sink.record_failure(Operation::Upload, e.failure_reason());
            Err(e).context("upload failed")
        }
    }
}

async fn run_download(args: &DownloadArgs, sink: &MetricsSink) -> Result<()> {
    let store_config = ObjectStoreConfig::from_env(&args.store.bucket, &args.store.compartment)?;
    println!("🔗 Connecting to object storage...");
    let client = ObjectStoreClient::new(&store_config).await;
    println!("✓ Connected (compartment: {})", client.compartment_id());
    println!("📥 Downloading object: {}", args.object);

    match client.download_file(&args.object, &args.output).await {
        Ok(result) => {
            sink.record_success(Operation::Download, result.duration);
            println!("\n✅ Download successful!");
            println!("  Object: {}", result.object_key);
            println!("  Local path: {}", result.local_path.display());
            println!("  Size: {:.2} MB", result.size as f64 / 1024.0 / 1024.0);
            println!("  Duration: {:.2}s", result.duration.as_secs_f64());
            if let Some(modified) = result.last_modified {
                println!("  Last modified: {}", modified.to_rfc3339());
            }
            Ok(())
        }
        Err(e) => {
            sink.record_failure(Operation::Download, e.failure_reason());
            Err(e).context("download failed")
        }
    }
}

async fn run_restore(args: &RestoreArgs, sink: &MetricsSink) -> Result<()> {
    let database = args
        .db
        .to_postgres_config()
        .context("--db-name is required for restore")?;

    let store = match (&args.from_cloud, &args.bucket, &args.compartment) {
        (Some(_), Some(bucket), Some(compartment)) => {
            Some(ObjectStoreConfig::from_env(bucket, compartment)?)
        }
        _ => None,
    };

    let request = restore::RestoreRequest {
        database,
        local_file: args.file.clone(),
        from_cloud: args.from_cloud.clone(),
        target_db: args.target_db.clone(),
        encryption_key: resolve_encryption_key(args.encryption_key.as_deref()),
        store,
        skip_confirm: args.skip_confirm,
    };

    restore::run_restore_flow(&restore::PsqlRestore, &request, sink).await
}

async fn run_list(args: &ListArgs) -> Result<()> {
    let store_config = ObjectStoreConfig::from_env(&args.store.bucket, &args.store.compartment)?;
    println!("🔗 Connecting to object storage...");
    let client = ObjectStoreClient::new(&store_config).await;
    println!("📋 Listing backups from bucket: {}\n", client.bucket_name());

    let objects = if args.all {
        client.list_objects("").await?
    } else if let (Some(year), Some(month)) = (args.year, args.month) {
        client.list_backups_by_date(year, month).await?
    } else if let Some(year) = args.year {
        client.list_objects(&format!("backups/{}/", year)).await?
    } else {
        client.list_backups().await?
    };

    if objects.is_empty() {
        println!("No backups found.");
        return Ok(());
    }

    println!("Found {} backup(s):\n", objects.len());
    let mut total_size = 0u64;
    for (i, object) in objects.iter().enumerate() {
        println!("{}. {}", i + 1, object.key);
        println!("   Size: {:.2} MB", object.size as f64 / 1024.0 / 1024.0);
        if let Some(modified) = object.last_modified {
            println!("   Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        println!("   ETag: {}\n", object.etag);
        total_size += object.size;
    }
    println!(
        "Total: {} file(s), {:.2} MB",
        objects.len(),
        total_size as f64 / 1024.0 / 1024.0
    );

    Ok(())
}

fn run_keygen() -> Result<()> {
    let key = encryption::generate_key();

    println!("🔑 Generated 256-bit encryption key:");
    println!("{}", key);
    println!();
    println!("⚠️  IMPORTANT:");
    println!("   - Store this key securely!");
    println!("   - Never commit it to version control");
    println!("   - Backup the key (lost key = lost backups)");
    println!();
    println!("Usage:");
    println!("   export BACKUP_ENCRYPTION_KEY=\"{}\"", key);
    println!("   drbackup backup --encrypt --name mydb --db-name mydb ...");

    Ok(())
}

async fn run_serve(args: &ServeArgs, sink: Arc<MetricsSink>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("🚀 Starting metrics server on {}:{}", args.address, args.port);
    println!("   Metrics endpoint: http://{}:{}/metrics", args.address, args.port);
    println!("   Health endpoint:  http://{}:{}/health", args.address, args.port);

    metrics::server::serve(sink, &args.address, args.port).await
}

fn run_schedule(args: &ScheduleArgs) -> Result<()> {
    match &args.command {
        ScheduleCommands::Init { output } => {
            println!("📝 Generating example backup schedule: {}", output.display());
            schedule::write_example(output)?;
            println!("✓ Created {}\n", output.display());
            println!("📋 Example schedules:");
            println!("  • Daily backup:   every day at midnight (0 0 * * *)");
            println!("  • Weekly backup:  every Sunday at 3 AM (0 3 * * 0)");
            println!("  • Monthly backup: 1st of month at 2 AM (0 2 1 * *)");
            println!("\n⚠️  Edit the file to set credentials, encryption keys and schedules.");
            Ok(())
        }
        ScheduleCommands::Validate { file } => {
            println!("🔍 Validating schedule file: {}", file.display());
            let config = schedule::load(file)?;
            schedule::validate(&config)?;
            println!("✓ Validation successful!");
            Ok(())
        }
        ScheduleCommands::Deploy { file, dry_run } => {
            println!("🚀 Deploying schedule file: {}", file.display());
            let config = schedule::load(file)?;
            schedule::deploy(&config, *dry_run)?;
            if !dry_run {
                println!("✓ Deployment successful! Backup schedules are now active.");
                println!("\n📋 View the current crontab with: crontab -l");
            }
            Ok(())
        }
    }
}

/// CLI key if given, otherwise the BACKUP_ENCRYPTION_KEY environment
/// variable.
fn resolve_encryption_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| env::var("BACKUP_ENCRYPTION_KEY").ok().filter(|key| !key.is_empty()))
}
