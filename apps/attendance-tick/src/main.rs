use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{CommandFactory, Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs, DatabaseConfig};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use attendance::client::AttendanceApi;
use attendance::domain::service::ServiceConfig;
use attendance::{AttendanceConfig, AttendanceModule};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Key of the engine's section under `modules:` in the app config.
const MODULE_NAME: &str = "attendance";

const MEMORY_DSN: &str = "sqlite::memory:";

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps "sqlite::memory:" as-is.
/// - Normalizes backslashes into forward slashes (important on Windows).
/// - Adds `mode=rwc` so a missing database file is created.
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path, create_dirs: bool) -> Result<String> {
    if dsn.eq_ignore_ascii_case(MEMORY_DSN) || dsn.eq_ignore_ascii_case("sqlite://:memory:") {
        return Ok(MEMORY_DSN.to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {})", dsn))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    if let Some(dir) = p.parent() {
        if create_dirs {
            std::fs::create_dir_all(dir)?;
        }
    }

    // Rebuild DSN with absolute path and normalized slashes
    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    match query {
        Some(q) if q.split('&').any(|kv| kv.starts_with("mode=")) => {
            out.push('?');
            out.push_str(q);
        }
        Some(q) => {
            out.push('?');
            out.push_str(q);
            out.push_str("&mode=rwc");
        }
        None => out.push_str("?mode=rwc"),
    }
    Ok(out)
}

/// Attendance tick - roll-call scheduling, expiry and attendance summaries
#[derive(Parser)]
#[command(name = "attendance-tick")]
#[command(about = "Attendance tick - roll-call scheduling, expiry and attendance summaries")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Schedule roll-calls for the current hour (every organization unless --org is given)
    Schedule {
        /// Only schedule this organization
        #[arg(long)]
        org: Option<i64>,
        /// Roll-calls per hour for --org (organization setting otherwise)
        #[arg(long, requires = "org")]
        target: Option<i64>,
        /// Instant to schedule for, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Mark overdue pending roll-calls as missed
    Expire {
        /// Instant to expire against, RFC 3339 (defaults to now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Print a day (or inclusive date range) summary as JSON
    Summarize {
        #[arg(long)]
        user: i64,
        /// Local date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
        /// Last local date of a range summary
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;

    // Apply CLI overrides (verbosity)
    config.apply_cli_overrides(&args);

    // Initialize logging
    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.app.home_dir));
    tracing::info!("attendance-tick starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let module_config: AttendanceConfig = config.module_config(MODULE_NAME)?;

    match command {
        Commands::Check => check_config(&config, &module_config),
        Commands::Migrate => {
            let db = connect(&config).await?;
            AttendanceModule::default().migrate(&db).await?;
            println!("Migrations applied");
            Ok(())
        }
        Commands::Schedule { org, target, at } => {
            let api = open_engine(&config, &module_config).await?;
            schedule(api, org, target, at.unwrap_or_else(Utc::now)).await
        }
        Commands::Expire { at } => {
            let api = open_engine(&config, &module_config).await?;
            expire(api, at.unwrap_or_else(Utc::now)).await
        }
        Commands::Summarize { user, date, to } => {
            let api = open_engine(&config, &module_config).await?;
            summarize(api, user, date, to).await
        }
    }
}

/// Detect DB backend from URL scheme (sqlite/postgres).
fn detect_from_dsn(cfg: &DatabaseConfig) -> Result<&'static str> {
    let raw = cfg.url.trim().to_owned();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }

    let url = Url::parse(&raw).map_err(|e| anyhow!("Invalid database DSN '{}': {}", raw, e))?;

    match url.scheme() {
        "sqlite" | "sqlite3" => Ok("sqlite"),
        "postgres" | "postgresql" => Ok("postgres"),
        other => Err(anyhow!("Unsupported database type: {}", other)),
    }
}

async fn connect(config: &AppConfig) -> Result<DatabaseConnection> {
    let db_config = config
        .database
        .as_ref()
        .ok_or_else(|| anyhow!("Database URL not configured"))?;
    let backend = detect_from_dsn(db_config)?;

    // Base dir for resolving relative sqlite paths (already absolute & created)
    let base_dir = PathBuf::from(&config.app.home_dir);
    let mut dsn = db_config.url.trim().to_owned();
    if backend == "sqlite" {
        dsn = absolutize_sqlite_dsn(&dsn, &base_dir, true)?;
    }

    let mut opts = ConnectOptions::new(dsn.clone());
    opts.max_connections(db_config.max_conns.unwrap_or(10))
        .acquire_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    if backend == "sqlite" {
        let busy = Duration::from_millis(u64::from(db_config.busy_timeout_ms.unwrap_or(5000)));
        opts.map_sqlx_sqlite_opts(move |o| o.busy_timeout(busy));
    }
    if dsn == MEMORY_DSN {
        // Every pooled connection would otherwise get its own empty database.
        opts.max_connections(1);
    }

    tracing::info!("Connecting to database: {}", dsn);
    let db = Database::connect(opts)
        .await
        .with_context(|| format!("Failed to connect to database '{dsn}'"))?;
    tracing::info!(backend, "Connected to database");
    Ok(db)
}

/// Connect, migrate and wire the engine.
async fn open_engine(
    config: &AppConfig,
    module_config: &AttendanceConfig,
) -> Result<Arc<dyn AttendanceApi>> {
    let db = connect(config).await?;
    let module = AttendanceModule::default();
    module.migrate(&db).await?;
    module.init(db, module_config)
}

async fn schedule(
    api: Arc<dyn AttendanceApi>,
    org: Option<i64>,
    target: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let scheduled = match org {
        Some(org_id) => api
            .schedule_for_current_hour(org_id, now, target)
            .await?
            .len(),
        None => api.tick(now).await?,
    };
    tracing::info!(scheduled, %now, "Scheduling finished");
    println!("{}", serde_json::json!({ "scheduled": scheduled, "at": now }));
    Ok(())
}

async fn expire(api: Arc<dyn AttendanceApi>, now: DateTime<Utc>) -> Result<()> {
    let expired = api.expire_pending(now).await?;
    tracing::info!(expired, %now, "Expiry finished");
    println!("{}", serde_json::json!({ "expired": expired, "at": now }));
    Ok(())
}

async fn summarize(
    api: Arc<dyn AttendanceApi>,
    user: i64,
    date: NaiveDate,
    to: Option<NaiveDate>,
) -> Result<()> {
    let output = match to {
        Some(end) => serde_json::to_string_pretty(&api.summarize_range(user, date, end).await?)?,
        None => serde_json::to_string_pretty(&api.summarize_day(user, date).await?)?,
    };
    println!("{output}");
    Ok(())
}

fn check_config(config: &AppConfig, module_config: &AttendanceConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    if let Some(db_config) = config.database.as_ref() {
        detect_from_dsn(db_config)?;
    }
    let service_config = ServiceConfig::from_config(module_config)?;
    tracing::info!(
        default_timezone = %service_config.default_timezone.name(),
        "Configuration is valid"
    );
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn memory_dsn_is_kept() {
        let base = Path::new("/unused");
        assert_eq!(absolutize_sqlite_dsn("sqlite::memory:", base, false).unwrap(), MEMORY_DSN);
        assert_eq!(absolutize_sqlite_dsn("sqlite://:memory:", base, false).unwrap(), MEMORY_DSN);
    }

    #[test]
    fn relative_sqlite_path_is_resolved_against_home() {
        let tmp = tempdir().unwrap();
        let dsn = absolutize_sqlite_dsn("sqlite://database/att.db", tmp.path(), true).unwrap();
        let expected = tmp
            .path()
            .join("database/att.db")
            .to_string_lossy()
            .replace('\\', "/");
        assert_eq!(dsn, format!("sqlite://{expected}?mode=rwc"));
        assert!(tmp.path().join("database").is_dir());
    }

    #[test]
    fn explicit_mode_is_preserved() {
        let tmp = tempdir().unwrap();
        let dsn = absolutize_sqlite_dsn("sqlite://a.db?mode=ro", tmp.path(), false).unwrap();
        assert!(dsn.ends_with("a.db?mode=ro"));
        let dsn = absolutize_sqlite_dsn("sqlite://a.db?cache=shared", tmp.path(), false).unwrap();
        assert!(dsn.ends_with("a.db?cache=shared&mode=rwc"));
    }

    #[test]
    fn non_sqlite_dsn_is_rejected() {
        assert!(absolutize_sqlite_dsn("postgres://x/y", Path::new("/"), false).is_err());
        assert!(absolutize_sqlite_dsn("sqlite://", Path::new("/"), false).is_err());
    }

    #[test]
    fn backend_is_detected_from_scheme() {
        let cfg = |url: &str| DatabaseConfig {
            url: url.to_string(),
            max_conns: None,
            busy_timeout_ms: None,
        };
        assert_eq!(detect_from_dsn(&cfg("sqlite://a.db")).unwrap(), "sqlite");
        assert_eq!(detect_from_dsn(&cfg("postgresql://h/db")).unwrap(), "postgres");
        assert!(detect_from_dsn(&cfg("mysql://h/db")).is_err());
        assert!(detect_from_dsn(&cfg("  ")).is_err());
    }
}
