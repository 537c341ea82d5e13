use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deskwatch::storage::sqlite3::SqliteStore;
use deskwatch::util::config::AppConfig;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about = "deskwatch admin/bootstrapping CLI")]
struct Cli {
    /// SQLite database to operate on. Defaults to the configured one.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workspace directory and database schema.
    Init,
    /// Register a subject so its activity can be recorded.
    AddSubject { name: String },
    /// List registered subjects.
    Subjects,
    /// Show the most recent activity records, newest first.
    Logs {
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

fn ensure_workspace_dir(workspace_dir: &Path) -> Result<()> {
    if !workspace_dir.exists() {
        std::fs::create_dir_all(workspace_dir).context("Failed to create workspace directory")?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(workspace_dir)?.permissions();
        perms.set_mode(0o700);
        std::fs::set_permissions(workspace_dir, perms)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = AppConfig::load().context("Failed to load configuration")?;
    let db_path = cli.db.clone().unwrap_or_else(|| cfg.database_path());

    match cli.command {
        Commands::Init => {
            ensure_workspace_dir(&cfg.workspace_dir)?;
            let store = SqliteStore::open(&db_path)?;
            println!("Initialized workspace at {}", cfg.workspace_dir.display());
            println!("Database ready at {}", store.db_path().display());
        }
        Commands::AddSubject { name } => {
            let name = name.trim();
            anyhow::ensure!(!name.is_empty(), "subject name must not be blank");
            let mut store = SqliteStore::open(&db_path)?;
            let id = store.add_subject(name)?;
            println!("{}\t{}", id, name);
        }
        Commands::Subjects => {
            let store = SqliteStore::open(&db_path)?;
            for (id, name) in store.list_subjects()? {
                println!("{}\t{}", id, name);
            }
        }
        Commands::Logs { subject, limit } => {
            let store = SqliteStore::open(&db_path)?;
            for record in store.recent_logs(subject.as_deref(), limit)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    record.id, record.log_time, record.subject_id, record.template, record.log
                );
            }
        }
    }
    Ok(())
}
