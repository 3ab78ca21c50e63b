//! Database schema migrations.
//!
//! Version 1 creates the threads, messages and summaries tables. Messages
//! and summaries are append-only; triggers refuse UPDATE and DELETE.

use rusqlite::Connection;
use tracing::info;

use switchyard_core::error::SwitchyardError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), SwitchyardError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SwitchyardError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| {
            SwitchyardError::Storage(format!("Failed to query migration version: {}", e))
        })?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversation_schema");
    }

    Ok(())
}

/// Version 1: conversation schema. Timestamps are Unix microseconds.
fn apply_v1(conn: &Connection) -> Result<(), SwitchyardError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS threads (
            thread_id   TEXT PRIMARY KEY NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id       TEXT NOT NULL REFERENCES threads (thread_id),
            role            TEXT NOT NULL
                            CHECK (role IN ('user', 'assistant', 'system')),
            content         TEXT NOT NULL,
            handler_id      TEXT,
            confidence      REAL,
            structured_data TEXT,
            created_at      INTEGER NOT NULL,
            UNIQUE (thread_id, created_at)
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread_time
            ON messages (thread_id, created_at);

        CREATE TABLE IF NOT EXISTS summaries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            thread_id       TEXT NOT NULL REFERENCES threads (thread_id),
            summary         TEXT NOT NULL,
            topics          TEXT NOT NULL DEFAULT '[]',
            sentiment       TEXT NOT NULL DEFAULT 'neutral'
                            CHECK (sentiment IN ('positive', 'neutral', 'negative')),
            message_count   INTEGER NOT NULL,
            start_ts        INTEGER NOT NULL,
            end_ts          INTEGER NOT NULL,
            created_at      INTEGER NOT NULL,
            CHECK (end_ts > start_ts),
            UNIQUE (thread_id, start_ts)
        );

        CREATE INDEX IF NOT EXISTS idx_summaries_thread_end
            ON summaries (thread_id, end_ts);

        CREATE TRIGGER IF NOT EXISTS messages_no_update
            BEFORE UPDATE ON messages
            BEGIN SELECT RAISE(ABORT, 'messages are append-only'); END;

        CREATE TRIGGER IF NOT EXISTS messages_no_delete
            BEFORE DELETE ON messages
            BEGIN SELECT RAISE(ABORT, 'messages are append-only'); END;

        CREATE TRIGGER IF NOT EXISTS summaries_no_update
            BEFORE UPDATE ON summaries
            BEGIN SELECT RAISE(ABORT, 'summaries are append-only'); END;

        CREATE TRIGGER IF NOT EXISTS summaries_no_delete
            BEFORE DELETE ON summaries
            BEGIN SELECT RAISE(ABORT, 'summaries are append-only'); END;

        INSERT INTO schema_migrations (version, name) VALUES (1, 'conversation_schema');
        ",
    )
    .map_err(|e| SwitchyardError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_messages_reject_update_and_delete() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO threads (thread_id, created_at) VALUES ('t1', 1);
             INSERT INTO messages (thread_id, role, content, created_at)
                 VALUES ('t1', 'user', 'hello', 2);",
        )
        .unwrap();

        let update = conn.execute("UPDATE messages SET content = 'edited'", []);
        assert!(update.unwrap_err().to_string().contains("append-only"));

        let delete = conn.execute("DELETE FROM messages", []);
        assert!(delete.is_err());
    }

    #[test]
    fn test_summary_range_must_be_non_empty() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute("INSERT INTO threads (thread_id, created_at) VALUES ('t1', 1)", [])
            .unwrap();
        let result = conn.execute(
            "INSERT INTO summaries (thread_id, summary, message_count, start_ts, end_ts, created_at)
             VALUES ('t1', 's', 0, 5, 5, 6)",
            [],
        );
        assert!(result.is_err());
    }
}
