use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use ptdump::attachments::AttachmentStorage;
use ptdump::config::{ExportConfig, Settings};
use ptdump::export::{ExportOptions, Exporter, LogProgress};
use ptdump::logging;
use ptdump::store::migrate::load_migrations;
use ptdump::store::{SqliteStore, Store, schema};
use ptdump::tracker::{RateLimiter, TrackerClient};
use ptdump::verify::verify_attachments;

#[derive(Parser)]
#[command(name = "ptdump")]
#[command(about = "Dump a Pivotal Tracker project into a SQLite database", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a project, its stories, comments and attachments
    Export(ExportArgs),

    /// Print row counts of an exported database
    Stats {
        /// Database file to inspect
        #[arg(long, env = "DB_FILE_NAME")]
        db: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare attachment files on disk with the content stored in the database
    Verify {
        /// Database file to check
        #[arg(long, env = "DB_FILE_NAME")]
        db: String,

        /// Directory the attachments were written to
        #[arg(long, env = "FILE_ATTACHMENTS_DIR")]
        attachments_dir: PathBuf,
    },
}

#[derive(Args)]
struct ExportArgs {
    /// Tracker project id
    #[arg(long, env = "TRACKER_PROJECT_ID")]
    project_id: Option<i64>,

    /// Tracker API token
    #[arg(long, env = "TRACKER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Tracker host (e.g., "https://www.pivotaltracker.com")
    #[arg(long, env = "TRACKER_API_URL")]
    api_url: Option<String>,

    /// SQLite database file. Defaults to ptdump_<timestamp>.db
    #[arg(long, env = "DB_FILE_NAME")]
    db: Option<String>,

    /// Also write every attachment to this directory as <id>_<filename>
    #[arg(long, env = "FILE_ATTACHMENTS_DIR")]
    attachments_dir: Option<PathBuf>,

    /// Directory of NNNN_name.sql migrations to apply instead of the built-in schema
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Debug log file. Defaults to ptdump_<timestamp>.log
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Stories fetched per request
    #[arg(long)]
    page_size: Option<u64>,

    /// Requests admitted per rate interval
    #[arg(long)]
    rate: Option<u32>,

    /// Length of the rate interval in milliseconds
    #[arg(long)]
    rate_interval_ms: Option<u64>,

    /// Maximum requests in flight
    #[arg(long)]
    concurrency: Option<u32>,

    /// Whole-request timeout in seconds. No timeout unless set
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// TOML file with default values for any of the options above
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ExportArgs {
    fn into_settings(self) -> anyhow::Result<Settings> {
        let settings = Settings {
            project_id: self.project_id,
            token: self.token,
            api_url: self.api_url,
            db: self.db,
            attachments_dir: self.attachments_dir,
            migrations_dir: self.migrations_dir,
            log_file: self.log_file,
            page_size: self.page_size,
            rate: self.rate,
            rate_interval_ms: self.rate_interval_ms,
            concurrency: self.concurrency,
            timeout_secs: self.timeout_secs,
        };

        match self.config {
            Some(path) => Ok(settings.or(Settings::load(&path)?)),
            None => Ok(settings),
        }
    }
}

/// Opens an existing export read-only, refusing to create a new database.
fn open_existing(db: &str) -> anyhow::Result<SqliteStore> {
    let db_path = Path::new(db.strip_prefix("file:").unwrap_or(db));
    if !db_path.exists() {
        bail!("Database not found at {}", db_path.display());
    }
    SqliteStore::open_read_only(db_path).map_err(Into::into)
}

async fn run_export(args: ExportArgs) -> anyhow::Result<()> {
    let run_id = Utc::now().timestamp_millis();
    let config = ExportConfig::from_settings(args.into_settings()?, run_id)?;

    logging::init_with_file(&config.log_file)?;
    info!("Using database: {}", config.db_path.display());

    let migrations = match &config.migrations_dir {
        Some(dir) => load_migrations(dir)?,
        None => schema::embedded(),
    };

    let limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let client = TrackerClient::new(
        &config.api_url,
        &config.token,
        config.request_timeout,
        limiter,
    )?;
    let store = SqliteStore::new(&config.db_path)?;
    let storage = config.attachments_dir.clone().map(AttachmentStorage::new);
    let mut progress = LogProgress::new();

    let options = ExportOptions {
        project_id: config.project_id,
        page_size: config.page_size,
        migrations,
    };
    let mut exporter = Exporter::new(&client, &store, &mut progress, options);
    if let Some(storage) = &storage {
        info!("Writing file attachments to {}", storage.base_path().display());
        exporter = exporter.with_attachment_storage(storage);
    }

    let summary = exporter.run().await?;
    info!(
        project = %summary.project_name,
        people = summary.people,
        labels = summary.labels,
        stories = summary.stories,
        comments = summary.comments,
        attachments = summary.attachments,
        "Export finished"
    );

    Ok(())
}

fn run_stats(db: String, json: bool) -> anyhow::Result<()> {
    let store = open_existing(&db)?;
    let counts = store.table_counts()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    println!("project:              {}", counts.project);
    println!("person:               {}", counts.person);
    println!("label:                {}", counts.label);
    println!("story:                {}", counts.story);
    println!("story_owner:          {}", counts.story_owner);
    println!("story_label:          {}", counts.story_label);
    println!("story_comment:        {}", counts.story_comment);
    println!("file_attachment:      {}", counts.file_attachment);
    println!("file_attachment_file: {}", counts.file_attachment_file);

    Ok(())
}

async fn run_verify(db: String, attachments_dir: PathBuf) -> anyhow::Result<()> {
    let store = open_existing(&db)?;
    let storage = AttachmentStorage::new(attachments_dir);

    let report = verify_attachments(&store, &storage).await?;
    println!(
        "Checked {} attachments: {} matched, {} missing files, {} missing blobs, {} mismatched",
        report.checked,
        report.matched,
        report.missing_files.len(),
        report.missing_blobs.len(),
        report.mismatched.len()
    );

    if !report.is_ok() {
        bail!("{} attachment(s) failed verification", report.failures());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export(args) => run_export(args).await?,
        Commands::Stats { db, json } => {
            logging::init_console()?;
            run_stats(db, json)?;
        }
        Commands::Verify {
            db,
            attachments_dir,
        } => {
            logging::init_console()?;
            run_verify(db, attachments_dir).await?;
        }
    }

    Ok(())
}
