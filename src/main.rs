use chrono::Local;
use clap::Parser;
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use pg_expire_backup::expire::expire_config::{ExpireConfig, ExpireConfigLayer};
use pg_expire_backup::expire::report::TracingReporter;
use pg_expire_backup::expire::result_error::result::Result;
use pg_expire_backup::expire::retention::RetentionWindow;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;

const LOG_MAX_BYTES: usize = 2 * 1024 * 1024;
const LOG_BACKUP_COUNT: usize = 1;

/// Expire PostgreSQL base backups and archived WAL segments older than N days
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
    /// Log to stdout instead of the log file
    #[arg(long)]
    stdout: bool,
    /// Log file, defaults to ../log/expirebackup.log next to the executable
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Archive location holding wal/ and data/
    #[arg(short, long, env = "PGBCK")]
    warch: Option<PathBuf>,
    /// How many days of backups to keep
    #[arg(short, long, env = "PGBCK_KEEP_DAYS")]
    keepdays: Option<u32>,
    /// Only log what would be deleted
    #[arg(short = 'n', long)]
    dry_run: bool,
    /// YAML config file, used for anything not given on the command line or environment
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    // Flushes the log file on drop, so it has to outlive every event.
    let _log_guard = init_logging(&args);
    debug!("expirebackup started");

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(1);
        }
    };

    let summary = config.run(Local::now().naive_local(), &TracingReporter);
    info!("Expiration finished\n{summary}");
    match summary.into_error() {
        Some(e) => {
            error!("Expiration finished with errors:\n{e}");
            ExitCode::from(2)
        }
        None => ExitCode::SUCCESS,
    }
}

fn resolve_config(args: &Args) -> Result<ExpireConfig> {
    let cli = ExpireConfigLayer {
        archive_root: args.warch.clone(),
        keep_days: args.keepdays.map(RetentionWindow::days),
        dry_run: args.dry_run.then_some(true),
        ..ExpireConfigLayer::default()
    };
    let layer = match &args.config {
        Some(path) => cli.or(ExpireConfigLayer::from_yaml_file(path)?),
        None => cli,
    };
    let config = ExpireConfig::try_from(layer)?;
    debug!("Resolved config: {:?}", config);
    Ok(config)
}

fn init_logging(args: &Args) -> Option<WorkerGuard> {
    let level = if args.debug { Level::DEBUG } else { Level::INFO };
    let subscriber = tracing_subscriber::fmt().with_max_level(level);
    if args.stdout {
        subscriber.init();
        return None;
    }

    let log_file = args.log_file.clone().unwrap_or_else(default_log_file);
    match open_log_file(&log_file) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            subscriber.with_ansi(false).with_writer(writer).init();
            Some(guard)
        }
        Err(e) => {
            subscriber.init();
            warn!("Could not open log file {:?}, using stdout: {}", log_file, e);
            None
        }
    }
}

fn default_log_file() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_default()
        .join("../log/expirebackup.log")
}

/// Size capped log file keeping one rotated copy next to it.
fn open_log_file(path: &Path) -> std::io::Result<FileRotate<AppendCount>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    // FileRotate does not report open errors; open once here so the caller can fall back.
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(FileRotate::new(
        path,
        AppendCount::new(LOG_BACKUP_COUNT),
        ContentLimit::Bytes(LOG_MAX_BYTES),
        Compression::None,
        #[cfg(unix)]
        None,
    ))
}
