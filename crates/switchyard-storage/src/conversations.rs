//! Append-only repository for threads, messages and summaries.
//!
//! There are no update or delete operations. Message timestamps are assigned
//! inside the insert transaction so they are strictly increasing per thread
//! and always later than the thread's `created_at`.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};

use switchyard_core::error::SwitchyardError;
use switchyard_core::types::{
    ConversationSummary, ConversationThread, Message, MessageMetadata, Role, Sentiment, Timestamp,
};

use crate::db::Database;

/// A summary about to be persisted for `(start_ts, end_ts]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSummary {
    pub thread_id: String,
    pub summary_text: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub message_count: u32,
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
}

/// Repository over the conversation tables.
#[derive(Debug, Clone)]
pub struct ConversationRepository {
    db: Arc<Database>,
}

const MESSAGE_COLUMNS: &str =
    "id, thread_id, role, content, handler_id, confidence, structured_data, created_at";

const SUMMARY_COLUMNS: &str =
    "id, thread_id, summary, topics, sentiment, message_count, start_ts, end_ts, created_at";

fn storage(context: &str) -> impl Fn(rusqlite::Error) -> SwitchyardError + '_ {
    move |e| SwitchyardError::Storage(format!("{}: {}", context, e))
}

impl ConversationRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Threads
    // =========================================================================

    pub fn find_thread(&self, thread_id: &str) -> Result<Option<ConversationThread>, SwitchyardError> {
        self.db.with_conn(|conn| find_thread(conn, thread_id))
    }

    /// Return the thread, creating it at `now` if it does not exist yet.
    pub fn ensure_thread(
        &self,
        thread_id: &str,
        now: Timestamp,
    ) -> Result<ConversationThread, SwitchyardError> {
        self.db.with_conn(|conn| ensure_thread(conn, thread_id, now))
    }

    /// Most recently active threads first.
    pub fn list_threads(&self, limit: u32) -> Result<Vec<ConversationThread>, SwitchyardError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT t.thread_id, t.created_at
                     FROM threads t
                     LEFT JOIN messages m ON m.thread_id = t.thread_id
                     GROUP BY t.thread_id
                     ORDER BY COALESCE(MAX(m.created_at), t.created_at) DESC
                     LIMIT ?1",
                )
                .map_err(storage("Failed to prepare thread listing"))?;
            let rows = stmt
                .query_map(rusqlite::params![limit], |row| {
                    Ok(ConversationThread {
                        thread_id: row.get(0)?,
                        created_at: Timestamp(row.get(1)?),
                    })
                })
                .map_err(storage("Failed to list threads"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(storage("Failed to read thread row"))
        })
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Append a message, creating the thread if needed.
    ///
    /// The stored timestamp is `max(now, last + 1µs, created_at + 1µs)`.
    pub fn append_message(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
        metadata: &MessageMetadata,
        now: Timestamp,
    ) -> Result<Message, SwitchyardError> {
        let structured = metadata
            .structured_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage("Failed to begin append"))?;

            let thread = ensure_thread(&tx, thread_id, now)?;
            let last: Option<i64> = tx
                .query_row(
                    "SELECT MAX(created_at) FROM messages WHERE thread_id = ?1",
                    rusqlite::params![thread_id],
                    |row| row.get(0),
                )
                .map_err(storage("Failed to read last message time"))?;

            let floor = last.unwrap_or(thread.created_at.0).max(thread.created_at.0) + 1;
            let created_at = Timestamp(now.0.max(floor));

            tx.execute(
                "INSERT INTO messages (thread_id, role, content, handler_id, confidence, structured_data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    thread_id,
                    role.to_string(),
                    content,
                    metadata.handler_id,
                    metadata.confidence,
                    structured,
                    created_at.0,
                ],
            )
            .map_err(storage("Failed to insert message"))?;
            let id = tx.last_insert_rowid();

            tx.commit().map_err(storage("Failed to commit append"))?;

            Ok(Message {
                id,
                thread_id: thread_id.to_string(),
                role,
                content: content.to_string(),
                handler_id: metadata.handler_id.clone(),
                confidence: metadata.confidence,
                structured_data: metadata.structured_data.clone(),
                created_at,
            })
        })
    }

    /// The `limit` most recent messages, oldest first.
    pub fn recent_messages(&self, thread_id: &str, limit: u32) -> Result<Vec<Message>, SwitchyardError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM (
                     SELECT * FROM messages WHERE thread_id = ?1
                     ORDER BY created_at DESC LIMIT ?2
                 ) ORDER BY created_at ASC",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, rusqlite::params![thread_id, limit])
        })
    }

    /// Messages with `start < created_at <= end`, oldest first.
    pub fn messages_in_range(
        &self,
        thread_id: &str,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Message>, SwitchyardError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE thread_id = ?1 AND created_at > ?2 AND created_at <= ?3
                 ORDER BY created_at ASC",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, rusqlite::params![thread_id, start.0, end.0])
        })
    }

    /// Messages strictly after `after`, oldest first.
    pub fn messages_after(&self, thread_id: &str, after: Timestamp) -> Result<Vec<Message>, SwitchyardError> {
        self.messages_in_range(thread_id, after, Timestamp(i64::MAX))
    }

    pub fn count_messages(&self, thread_id: &str) -> Result<u64, SwitchyardError> {
        self.count_after(thread_id, Timestamp(i64::MIN))
    }

    /// Number of messages strictly after `after`.
    pub fn count_after(&self, thread_id: &str, after: Timestamp) -> Result<u64, SwitchyardError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM messages WHERE thread_id = ?1 AND created_at > ?2",
                    rusqlite::params![thread_id, after.0],
                    |row| row.get(0),
                )
                .map_err(storage("Failed to count messages"))?;
            Ok(count as u64)
        })
    }

    // =========================================================================
    // Summaries
    // =========================================================================

    /// End of the summarized prefix: the latest summary's `end_ts`, or the
    /// thread's `created_at` when nothing has been summarized.
    pub fn watermark(&self, thread_id: &str) -> Result<Option<Timestamp>, SwitchyardError> {
        self.db.with_conn(|conn| watermark(conn, thread_id))
    }

    pub fn latest_summary(&self, thread_id: &str) -> Result<Option<ConversationSummary>, SwitchyardError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM summaries WHERE thread_id = ?1 ORDER BY end_ts DESC LIMIT 1",
                SUMMARY_COLUMNS
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage("Failed to prepare summary lookup"))?;
            let row = stmt
                .query_row(rusqlite::params![thread_id], row_to_summary)
                .optional()
                .map_err(storage("Failed to read latest summary"))?;
            row.transpose()
        })
    }

    /// All summaries for a thread, oldest range first.
    pub fn summaries(&self, thread_id: &str) -> Result<Vec<ConversationSummary>, SwitchyardError> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM summaries WHERE thread_id = ?1 ORDER BY end_ts ASC",
                SUMMARY_COLUMNS
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(storage("Failed to prepare summary listing"))?;
            let rows = stmt
                .query_map(rusqlite::params![thread_id], row_to_summary)
                .map_err(storage("Failed to list summaries"))?;
            let mut summaries = Vec::new();
            for row in rows {
                summaries.push(row.map_err(storage("Failed to read summary row"))??);
            }
            Ok(summaries)
        })
    }

    /// Insert `summary` only if it starts exactly at the current watermark.
    ///
    /// Returns `Ok(None)` when another summary already advanced the
    /// watermark, leaving the table untouched.
    pub fn insert_summary_if_contiguous(
        &self,
        summary: &NewSummary,
        now: Timestamp,
    ) -> Result<Option<ConversationSummary>, SwitchyardError> {
        let topics = serde_json::to_string(&summary.topics)?;

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(storage("Failed to begin summary insert"))?;

            match watermark(&tx, &summary.thread_id)? {
                Some(mark) if mark == summary.start_ts => {}
                _ => return Ok(None),
            }

            tx.execute(
                "INSERT INTO summaries (thread_id, summary, topics, sentiment, message_count, start_ts, end_ts, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    summary.thread_id,
                    summary.summary_text,
                    topics,
                    summary.sentiment.to_string(),
                    summary.message_count,
                    summary.start_ts.0,
                    summary.end_ts.0,
                    now.0,
                ],
            )
            .map_err(storage("Failed to insert summary"))?;
            let id = tx.last_insert_rowid();

            tx.commit().map_err(storage("Failed to commit summary"))?;

            Ok(Some(ConversationSummary {
                id,
                thread_id: summary.thread_id.clone(),
                summary_text: summary.summary_text.clone(),
                topics: summary.topics.clone(),
                sentiment: summary.sentiment,
                message_count: summary.message_count,
                start_ts: summary.start_ts,
                end_ts: summary.end_ts,
                created_at: now,
            }))
        })
    }
}

// ============================================================================
// Connection-level helpers shared by transactional and plain paths.
// ============================================================================

fn find_thread(conn: &Connection, thread_id: &str) -> Result<Option<ConversationThread>, SwitchyardError> {
    conn.query_row(
        "SELECT thread_id, created_at FROM threads WHERE thread_id = ?1",
        rusqlite::params![thread_id],
        |row| {
            Ok(ConversationThread {
                thread_id: row.get(0)?,
                created_at: Timestamp(row.get(1)?),
            })
        },
    )
    .optional()
    .map_err(storage("Failed to read thread"))
}

fn ensure_thread(
    conn: &Connection,
    thread_id: &str,
    now: Timestamp,
) -> Result<ConversationThread, SwitchyardError> {
    conn.execute(
        "INSERT OR IGNORE INTO threads (thread_id, created_at) VALUES (?1, ?2)",
        rusqlite::params![thread_id, now.0],
    )
    .map_err(storage("Failed to create thread"))?;

    find_thread(conn, thread_id)?
        .ok_or_else(|| SwitchyardError::Storage(format!("Thread {} vanished after insert", thread_id)))
}

fn watermark(conn: &Connection, thread_id: &str) -> Result<Option<Timestamp>, SwitchyardError> {
    let latest_end: Option<i64> = conn
        .query_row(
            "SELECT MAX(end_ts) FROM summaries WHERE thread_id = ?1",
            rusqlite::params![thread_id],
            |row| row.get(0),
        )
        .map_err(storage("Failed to read summary watermark"))?;

    match latest_end {
        Some(end) => Ok(Some(Timestamp(end))),
        None => Ok(find_thread(conn, thread_id)?.map(|t| t.created_at)),
    }
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>, SwitchyardError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(storage("Failed to prepare message query"))?;
    let rows = stmt
        .query_map(params, row_to_message)
        .map_err(storage("Failed to query messages"))?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(row.map_err(storage("Failed to read message row"))??);
    }
    Ok(messages)
}

// ============================================================================
// Row-to-entity conversion.
// ============================================================================

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Message, SwitchyardError>> {
    let role: String = row.get(2)?;
    let structured: Option<String> = row.get(6)?;

    let role = match role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => return Ok(Err(SwitchyardError::Storage(e))),
    };
    let structured_data = match structured.map(|s| serde_json::from_str(&s)).transpose() {
        Ok(value) => value,
        Err(e) => return Ok(Err(e.into())),
    };

    Ok(Ok(Message {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        role,
        content: row.get(3)?,
        handler_id: row.get(4)?,
        confidence: row.get(5)?,
        structured_data,
        created_at: Timestamp(row.get(7)?),
    }))
}

fn row_to_summary(
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<Result<ConversationSummary, SwitchyardError>> {
    let topics: String = row.get(3)?;
    let sentiment: String = row.get(4)?;

    let topics = match serde_json::from_str::<Vec<String>>(&topics) {
        Ok(topics) => topics,
        Err(e) => return Ok(Err(e.into())),
    };

    Ok(Ok(ConversationSummary {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        summary_text: row.get(2)?,
        topics,
        sentiment: Sentiment::parse_lenient(&sentiment),
        message_count: row.get(5)?,
        start_ts: Timestamp(row.get(6)?),
        end_ts: Timestamp(row.get(7)?),
        created_at: Timestamp(row.get(8)?),
    }))
}
