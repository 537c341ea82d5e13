use clap::Parser;
use deskwatch::agent::capture::{
    ActiveWindowInspector, PlatformSleepInhibitor, SysinfoProcessNamer,
};
use deskwatch::agent::subject::resolve_subject;
use deskwatch::agent::{Agent, AgentParts, AgentSettings, MonitorError};
use deskwatch::storage::sqlite3::SqliteStore;
use deskwatch::util::config::AppConfig;
use deskwatch::util::logging::{self, error, info, warn};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about = "Records which window has focus for one subject")]
struct Cli {
    /// Subject to record activity for. Defaults to the session's login name.
    subject: Option<String>,

    /// SQLite database to write into.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Window sampling interval in milliseconds.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Do not prevent the system from sleeping.
    #[arg(long)]
    no_keep_awake: bool,
}

fn ensure_workspace_dir(workspace_dir: &Path) {
    if !workspace_dir.exists() {
        std::fs::create_dir_all(workspace_dir).unwrap_or_else(|e| {
            eprintln!("Failed to create workspace directory: {}", e);
            std::process::exit(1);
        });
    }
}

fn is_process_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    system.process(pid).is_some()
}

fn write_pid_file(pid_file: &Path) {
    if pid_file.exists() {
        match std::fs::read_to_string(pid_file) {
            Ok(content) => {
                if let Ok(existing_pid) = content.trim().parse::<u32>() {
                    if is_process_running(existing_pid) {
                        eprintln!(
                            "deskwatchd is already running for this workspace (PID: {})",
                            existing_pid
                        );
                        std::process::exit(1);
                    }
                    info!(
                        "Removing stale PID file (process {} no longer exists)",
                        existing_pid
                    );
                }
                let _ = std::fs::remove_file(pid_file);
            }
            Err(_) => {
                info!("Removing unreadable PID file");
                let _ = std::fs::remove_file(pid_file);
            }
        }
    }

    let current_pid = std::process::id();
    std::fs::write(pid_file, current_pid.to_string()).unwrap_or_else(|e| {
        eprintln!("Failed to write PID file: {}", e);
        std::process::exit(1);
    });
}

fn cleanup_pid_file(pid_file: &Path) {
    let current_pid = std::process::id();
    match std::fs::read_to_string(pid_file) {
        Ok(content) => match content.trim().parse::<u32>() {
            Ok(file_pid) if file_pid == current_pid => {
                if let Err(e) = std::fs::remove_file(pid_file) {
                    error!("Failed to remove PID file: {}", e);
                } else {
                    info!("Removed PID file");
                }
            }
            Ok(file_pid) => {
                error!(
                    "PID file holds PID {} instead of ours ({}); leaving it in place",
                    file_pid, current_pid
                );
            }
            Err(e) => error!("PID file contains invalid PID: {}. Error: {}", content, e),
        },
        Err(e) => error!("Failed to read PID file for cleanup: {}", e),
    }
}

fn setup_file_logging(log_dir: &Path) {
    std::fs::create_dir_all(log_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create log directory: {}", e);
        std::process::exit(1);
    });

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("deskwatchd")
        .filename_suffix("log")
        .max_log_files(7)
        .build(log_dir)
        .unwrap_or_else(|e| {
            eprintln!("Failed to create log appender: {}", e);
            std::process::exit(1);
        });

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .with_timer(fmt::time::ChronoUtc::new(
                    "%Y-%m-%dT%H:%M:%S%.6fZ".to_string(),
                )),
        )
        .with(env_filter)
        .init();
}

fn load_app_config(cli: &Cli) -> AppConfig {
    let mut config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.sample_interval_ms = interval_ms;
    }
    if cli.no_keep_awake {
        config.keep_awake_enabled = false;
    }
    config
}

fn open_store(config: &AppConfig) -> Result<SqliteStore, MonitorError> {
    SqliteStore::open(config.database_path()).map_err(MonitorError::Configuration)
}

fn main() {
    let cli = Cli::parse();
    let config = load_app_config(&cli);
    ensure_workspace_dir(&config.workspace_dir);

    setup_file_logging(&deskwatch::util::paths::log_dir(&config.workspace_dir));
    logging::set_run_id(logging::new_run_id());

    let pid_file = deskwatch::util::paths::pid_file(&config.workspace_dir);
    write_pid_file(&pid_file);

    info!("Starting deskwatchd");

    let store = match open_store(&config) {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            cleanup_pid_file(&pid_file);
            std::process::exit(1);
        }
    };
    info!("Writing activity to {:?}", store.db_path());

    let subject = resolve_subject(cli.subject.as_deref(), &config.default_subject);
    info!("Monitoring subject '{}'", subject);

    let agent = Agent::new(
        AgentSettings::from_config(&config),
        subject,
        AgentParts {
            inspector: Box::new(ActiveWindowInspector::new()),
            namer: Box::new(SysinfoProcessNamer::new()),
            inhibitor: Box::new(PlatformSleepInhibitor::new()),
            store: Box::new(store),
        },
    );

    let cancel = agent.cancel_token();
    if let Err(e) = ctrlc::set_handler(move || {
        if cancel.cancel() {
            info!("Termination signal received, stopping");
        }
    }) {
        warn!("Failed to install signal handler: {}", e);
    }

    let result = agent.run();
    cleanup_pid_file(&pid_file);

    match result {
        Ok(report) => info!(
            "deskwatchd exiting: persisted={} unresolved={} failed={} overflowed={} discarded={}",
            report.persisted, report.unresolved, report.failed, report.overflowed, report.discarded
        ),
        Err(e) => {
            error!("deskwatchd failed to start: {:#}", e);
            std::process::exit(1);
        }
    }
}
