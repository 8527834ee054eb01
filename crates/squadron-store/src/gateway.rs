use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row};
use squadron_core::{SquadronError, SquadronResult};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  codename TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'offline',
  last_heartbeat TEXT,
  tasks_completed INTEGER NOT NULL DEFAULT 0,
  tokens_used INTEGER NOT NULL DEFAULT 0,
  cost_usd REAL NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agents_codename ON agents(codename);
CREATE INDEX IF NOT EXISTS idx_agents_created ON agents(created_at);

CREATE TABLE IF NOT EXISTS tasks (
  id TEXT PRIMARY KEY,
  title TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  status TEXT NOT NULL DEFAULT 'backlog',
  priority TEXT NOT NULL DEFAULT 'medium',
  assignee_id TEXT REFERENCES agents(id) ON DELETE SET NULL,
  tags TEXT NOT NULL DEFAULT '[]',
  depends_on TEXT NOT NULL DEFAULT '',
  estimated_tokens INTEGER NOT NULL DEFAULT 0,
  actual_tokens INTEGER NOT NULL DEFAULT 0,
  retry_count INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL,
  completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
CREATE INDEX IF NOT EXISTS idx_tasks_assignee ON tasks(assignee_id);

CREATE TABLE IF NOT EXISTS task_results (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
  agent_id TEXT,
  response TEXT NOT NULL,
  tokens_used INTEGER NOT NULL DEFAULT 0,
  cost_usd REAL NOT NULL DEFAULT 0,
  duration_ms INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_task_results_task ON task_results(task_id, status);

CREATE TABLE IF NOT EXISTS auto_reviews (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  id TEXT NOT NULL UNIQUE,
  task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
  result_id TEXT NOT NULL,
  decision TEXT NOT NULL,
  reasons TEXT NOT NULL,
  checks TEXT NOT NULL,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_auto_reviews_task ON auto_reviews(task_id);

CREATE TABLE IF NOT EXISTS messages (
  id TEXT PRIMARY KEY,
  from_agent_id TEXT NOT NULL,
  to_agent_id TEXT,
  content TEXT NOT NULL,
  type TEXT NOT NULL DEFAULT 'message',
  read INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_unread ON messages(to_agent_id, read);

CREATE TABLE IF NOT EXISTS heartbeats (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  agent_id TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
  status TEXT NOT NULL,
  timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_heartbeats_agent ON heartbeats(agent_id, timestamp);
"#;

/// Leaf gateway over the SQLite store.
///
/// Exposes exactly two operations — parameterized [`query`](Self::query) and
/// [`execute`](Self::execute) — plus schema bootstrap. One connection behind a
/// mutex keeps a read-your-writes view for the whole process.
pub struct StoreGateway {
    conn: Mutex<Connection>,
}

impl StoreGateway {
    /// Opens (creating if needed) the database at `path` and bootstraps the
    /// schema. WAL mode and foreign keys are enabled, matching how the rest
    /// of the fleet tooling opens this file.
    pub fn open<P: AsRef<Path>>(path: P) -> SquadronResult<Self> {
        let conn = Connection::open(path).map_err(store_err)?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(store_err)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for tests).
    pub fn in_memory() -> SquadronResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(store_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> SquadronResult<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs a parameterized read statement, mapping each row through `map`.
    pub fn query<T, P, F>(&self, sql: &str, params: P, map: F) -> SquadronResult<Vec<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt.query_map(params, map).map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<T>>>().map_err(store_err)
    }

    /// Runs a parameterized read statement expected to yield at most one row.
    pub fn query_one<T, P, F>(&self, sql: &str, params: P, map: F) -> SquadronResult<Option<T>>
    where
        P: rusqlite::Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.query(sql, params, map)?.into_iter().next())
    }

    /// Runs a parameterized write statement; returns the affected row count.
    pub fn execute<P: rusqlite::Params>(&self, sql: &str, params: P) -> SquadronResult<usize> {
        let conn = self.conn.lock();
        conn.execute(sql, params).map_err(store_err)
    }

    /// The `last_insert_rowid` of the most recent insert on this connection.
    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.lock().last_insert_rowid()
    }
}

pub(crate) fn store_err(e: rusqlite::Error) -> SquadronError {
    SquadronError::Store(e.to_string())
}

/// Parses an RFC 3339 TEXT column back into a UTC timestamp.
pub(crate) fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Parses a status-like TEXT column through its `FromStr` impl.
pub(crate) fn parse_enum<T: std::str::FromStr<Err = String>>(
    idx: usize,
    value: String,
) -> rusqlite::Result<T> {
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_all_tables() {
        let store = StoreGateway::in_memory().unwrap();
        let tables = store
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                [],
                |row| row.get::<_, String>(0),
            )
            .unwrap();
        for expected in ["agents", "tasks", "task_results", "auto_reviews", "messages", "heartbeats"] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    }

    #[test]
    fn execute_reports_affected_rows() {
        let store = StoreGateway::in_memory().unwrap();
        let now = Utc::now().to_rfc3339();
        store
            .execute(
                "INSERT INTO agents (id, name, codename, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params!["a-1", "Nova", "NOVA", now],
            )
            .unwrap();
        let affected = store
            .execute(
                "UPDATE agents SET status = 'idle' WHERE id = ?1",
                rusqlite::params!["a-1"],
            )
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn query_reflects_same_session_writes() {
        let store = StoreGateway::in_memory().unwrap();
        let now = Utc::now().to_rfc3339();
        store
            .execute(
                "INSERT INTO agents (id, name, codename, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params!["a-1", "Nova", "NOVA", now],
            )
            .unwrap();
        let names = store
            .query("SELECT name FROM agents", [], |row| row.get::<_, String>(0))
            .unwrap();
        assert_eq!(names, vec!["Nova".to_string()]);
    }
}
