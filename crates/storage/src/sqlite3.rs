use crate::ActivityStore;
use anyhow::{Context, Result};
use deskwatch_core::records::{LogRecord, NewLogRecord, SubjectId};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store holding the `users` and `logs` tables.
pub struct SqliteStore {
    db_path: PathBuf,
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database and its schema.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {:?}", parent))?;
            }
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open database: {:?}", db_path))?;
        Self::init_db(&conn).context("Failed to initialize schema")?;
        debug!("SQLite store ready at {:?}", db_path);

        Ok(Self { db_path, conn })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn init_db(conn: &Connection) -> Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS logs (
                log_id INTEGER PRIMARY KEY AUTOINCREMENT,
                template VARCHAR(255) NOT NULL,
                log TEXT NOT NULL,
                log_time TEXT DEFAULT CURRENT_TIMESTAMP,
                user_id INTEGER NOT NULL,
                CONSTRAINT fk_user
                    FOREIGN KEY (user_id)
                    REFERENCES users(user_id)
                    ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_logs_user_time ON logs(user_id, log_time);",
        )?;
        Ok(())
    }

    /// Registers a subject, returning the existing identity if the name is taken.
    pub fn add_subject(&mut self, name: &str) -> Result<SubjectId> {
        self.conn
            .execute(
                "INSERT INTO users (username) VALUES (?1) ON CONFLICT(username) DO NOTHING",
                params![name],
            )
            .with_context(|| format!("Failed to insert subject '{name}'"))?;
        self.find_subject_id(name)?
            .with_context(|| format!("Subject '{name}' missing after insert"))
    }

    pub fn remove_subject(&mut self, name: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM users WHERE username = ?1", params![name])?;
        Ok(removed > 0)
    }

    pub fn list_subjects(&self) -> Result<Vec<(SubjectId, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, username FROM users ORDER BY user_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((SubjectId(row.get::<_, i64>(0)?), row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Most recent records first, optionally restricted to one subject.
    pub fn recent_logs(&self, subject: Option<&str>, limit: usize) -> Result<Vec<LogRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = match subject {
            Some(_) => self.conn.prepare(
                "SELECT l.log_id, l.template, l.log, l.log_time, l.user_id
                 FROM logs l JOIN users u ON u.user_id = l.user_id
                 WHERE u.username = ?1
                 ORDER BY l.log_id DESC
                 LIMIT ?2",
            )?,
            None => self.conn.prepare(
                "SELECT log_id, template, log, log_time, user_id
                 FROM logs
                 ORDER BY log_id DESC
                 LIMIT ?1",
            )?,
        };

        let mut rows = match subject {
            Some(name) => stmt.query(params![name, limit])?,
            None => stmt.query(params![limit])?,
        };

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(LogRecord {
                id: row.get(0)?,
                template: row.get(1)?,
                log: row.get(2)?,
                log_time: row.get(3)?,
                subject_id: SubjectId(row.get(4)?),
            });
        }
        Ok(out)
    }
}

impl ActivityStore for SqliteStore {
    fn find_subject_id(&mut self, name: &str) -> Result<Option<SubjectId>> {
        let id = self
            .conn
            .query_row(
                "SELECT user_id FROM users WHERE username = ?1 LIMIT 1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .with_context(|| format!("Failed to look up subject '{name}'"))?;
        Ok(id.map(SubjectId))
    }

    fn insert_log(&mut self, record: &NewLogRecord) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO logs (template, log, log_time, user_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.template,
                record.log,
                record.log_time_text(),
                record.subject_id.0,
            ],
        )
        .context("Failed to insert log record")?;
        let id = tx.last_insert_rowid();
        tx.commit().context("Failed to commit log record")?;
        Ok(id)
    }
}
