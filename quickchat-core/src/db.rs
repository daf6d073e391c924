use crate::error::{ChatError, Result};
use crate::models::{Exchange, Persona, PostTask, Setting};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::{Path, PathBuf};

/// Persisted preference store: configuration options, personas and
/// conversation history, each in its own table.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new() -> Result<Self> {
        let db_path = Self::db_path()?;
        Self::with_path(&db_path)
    }

    pub fn with_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChatError::storage(format!("Failed to create database directory: {e}"))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            ChatError::storage(format!(
                "Failed to open database at {}: {e}",
                path.display()
            ))
        })?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChatError::storage(format!("Failed to open in-memory database: {e}")))?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| ChatError::storage("Cannot determine home directory"))?;
        Ok(data_dir.join("quickchat"))
    }

    pub fn db_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("quickchat.db"))
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS personas (
                    name TEXT PRIMARY KEY,
                    system_message TEXT NOT NULL,
                    retain_prefix INTEGER NOT NULL DEFAULT 0,
                    transient INTEGER NOT NULL DEFAULT 0,
                    postprocessing TEXT,
                    description TEXT,
                    emoji TEXT
                );

                CREATE TABLE IF NOT EXISTS history (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL,
                    input_text TEXT NOT NULL,
                    user_message TEXT NOT NULL,
                    assistant_message TEXT NOT NULL,
                    transient INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_history_created_at ON history(created_at);
                ",
            )
            .map_err(|e| ChatError::storage(format!("Failed to initialize database: {e}")))
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| ChatError::storage(format!("Failed to get setting: {e}")))
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )
            .map_err(|e| ChatError::storage(format!("Failed to set setting: {e}")))?;
        Ok(())
    }

    pub fn delete_all_settings(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings", [])
            .map_err(|e| ChatError::storage(format!("Failed to delete settings: {e}")))?;
        Ok(())
    }

    pub fn get_all_settings(&self) -> Result<Vec<Setting>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM settings ORDER BY key ASC")
            .map_err(|e| ChatError::storage(format!("Failed to prepare query: {e}")))?;

        let settings = stmt
            .query_map([], |row| {
                Ok(Setting {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })
            .map_err(|e| ChatError::storage(format!("Failed to execute query: {e}")))?
            .collect::<SqlResult<Vec<Setting>>>()
            .map_err(|e| ChatError::storage(format!("Failed to collect results: {e}")))?;

        Ok(settings)
    }

    // --- Personas ---

    pub fn upsert_persona(&self, persona: &Persona) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO personas (name, system_message, retain_prefix, transient, postprocessing, description, emoji)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET system_message = ?2, retain_prefix = ?3, transient = ?4,
                    postprocessing = ?5, description = ?6, emoji = ?7",
                params![
                    persona.name,
                    persona.system_message,
                    persona.retain_prefix as i64,
                    persona.transient as i64,
                    persona.postprocessing.map(|task| task.as_str()),
                    persona.description,
                    persona.emoji,
                ],
            )
            .map_err(|e| ChatError::storage(format!("Failed to save persona: {e}")))?;
        Ok(())
    }

    pub fn delete_persona(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM personas WHERE name = ?1", params![name])
            .map_err(|e| ChatError::storage(format!("Failed to delete persona: {e}")))?;
        Ok(rows > 0)
    }

    pub fn delete_all_personas(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM personas", [])
            .map_err(|e| ChatError::storage(format!("Failed to delete personas: {e}")))?;
        Ok(())
    }

    pub fn list_personas(&self) -> Result<Vec<Persona>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT name, system_message, retain_prefix, transient, postprocessing, description, emoji
                 FROM personas ORDER BY name ASC",
            )
            .map_err(|e| ChatError::storage(format!("Failed to prepare query: {e}")))?;

        let personas = stmt
            .query_map([], Self::row_to_persona)
            .map_err(|e| ChatError::storage(format!("Failed to execute query: {e}")))?
            .collect::<SqlResult<Vec<Persona>>>()
            .map_err(|e| ChatError::storage(format!("Failed to collect results: {e}")))?;

        Ok(personas)
    }

    // --- History ---

    pub fn insert_exchange(&self, exchange: &Exchange) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO history (created_at, input_text, user_message, assistant_message, transient)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    format_timestamp(exchange.timestamp),
                    exchange.input_text,
                    exchange.user_message,
                    exchange.assistant_message,
                    exchange.transient as i64,
                ],
            )
            .map_err(|e| ChatError::storage(format!("Failed to add exchange: {e}")))?;
        Ok(())
    }

    /// All exchanges, newest first.
    pub fn list_exchanges(&self) -> Result<Vec<Exchange>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT created_at, input_text, user_message, assistant_message, transient
                 FROM history ORDER BY id DESC",
            )
            .map_err(|e| ChatError::storage(format!("Failed to prepare query: {e}")))?;

        let exchanges = stmt
            .query_map([], Self::row_to_exchange)
            .map_err(|e| ChatError::storage(format!("Failed to execute query: {e}")))?
            .collect::<SqlResult<Vec<Exchange>>>()
            .map_err(|e| ChatError::storage(format!("Failed to collect results: {e}")))?;

        Ok(exchanges)
    }

    pub fn delete_newest_exchange(&self) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM history WHERE id = (SELECT MAX(id) FROM history)",
                [],
            )
            .map_err(|e| ChatError::storage(format!("Failed to remove exchange: {e}")))?;
        Ok(rows > 0)
    }

    pub fn delete_exchanges_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM history WHERE created_at < ?1",
                params![format_timestamp(cutoff)],
            )
            .map_err(|e| ChatError::storage(format!("Failed to truncate history: {e}")))
    }

    pub fn delete_all_exchanges(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM history", [])
            .map_err(|e| ChatError::storage(format!("Failed to clear history: {e}")))?;
        Ok(())
    }

    fn row_to_persona(row: &rusqlite::Row) -> rusqlite::Result<Persona> {
        let postprocessing: Option<String> = row.get(4)?;
        Ok(Persona {
            name: row.get(0)?,
            system_message: row.get(1)?,
            retain_prefix: row.get::<_, i64>(2)? != 0,
            transient: row.get::<_, i64>(3)? != 0,
            // Unknown hook names from older data are dropped rather than failing the load.
            postprocessing: postprocessing.and_then(|name| name.parse::<PostTask>().ok()),
            description: row.get(5)?,
            emoji: row.get(6)?,
        })
    }

    fn row_to_exchange(row: &rusqlite::Row) -> rusqlite::Result<Exchange> {
        let created_at: String = row.get(0)?;
        let timestamp = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?
            .with_timezone(&Utc);
        Ok(Exchange {
            timestamp,
            input_text: row.get(1)?,
            user_message: row.get(2)?,
            assistant_message: row.get(3)?,
            transient: row.get::<_, i64>(4)? != 0,
        })
    }
}

// Fixed-width UTC format so timestamps compare correctly as text.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
