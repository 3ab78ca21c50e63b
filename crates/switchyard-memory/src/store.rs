//! The conversation store: append-only log per thread plus the summarization
//! lifecycle.
//!
//! Writes to one thread are serialized by a per-thread async mutex. The
//! watermark check runs under that mutex right after the insert, so the
//! range handed to a summarization task is a stable snapshot: `(watermark,
//! last appended message]`. Summarization runs in a background task; its
//! insert re-checks the watermark inside a transaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use switchyard_core::config::MemoryConfig;
use switchyard_core::types::{
    ConversationSummary, Message, MessageMetadata, Role, Timestamp,
};
use switchyard_storage::{ConversationRepository, NewSummary};

use crate::error::MemoryError;
use crate::insights::ConversationInsights;
use crate::summarizer::Summarizer;

/// Summaries (long-range context) plus the most recent raw messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedHistory {
    /// Oldest range first.
    pub summaries: Vec<ConversationSummary>,
    /// Oldest first.
    pub recent_messages: Vec<Message>,
    pub total_messages: u64,
    pub conversation_started: Option<Timestamp>,
}

/// Result of a history lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum History {
    Messages(Vec<Message>),
    Enriched(EnrichedHistory),
}

type ThreadLock = Arc<tokio::sync::Mutex<()>>;

pub struct ConversationStore {
    repo: ConversationRepository,
    summarizer: Arc<Summarizer>,
    config: MemoryConfig,
    thread_locks: Mutex<HashMap<String, ThreadLock>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    background: Mutex<JoinSet<()>>,
}

/// Clears a thread's in-flight marker when the summarization task ends,
/// including when it is aborted.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    thread_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.thread_id);
        }
    }
}

/// A handle on one thread's write lock. The table entry is removed when the
/// last lease for the thread is dropped.
struct ThreadLease<'a> {
    locks: &'a Mutex<HashMap<String, ThreadLock>>,
    thread_id: String,
    lock: ThreadLock,
}

impl ThreadLease<'_> {
    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

impl Drop for ThreadLease<'_> {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.locks.lock() {
            // Only the table and this lease still hold it.
            if Arc::strong_count(&self.lock) == 2 {
                locks.remove(&self.thread_id);
            }
        }
    }
}

impl ConversationStore {
    pub fn new(repo: ConversationRepository, summarizer: Summarizer, config: MemoryConfig) -> Self {
        Self {
            repo,
            summarizer: Arc::new(summarizer),
            config,
            thread_locks: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn thread_lock(&self, thread_id: &str) -> Result<ThreadLease<'_>, MemoryError> {
        let mut locks = self
            .thread_locks
            .lock()
            .map_err(|e| MemoryError::Storage(format!("thread lock table poisoned: {}", e)))?;
        let lock = locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Ok(ThreadLease {
            locks: &self.thread_locks,
            thread_id: thread_id.to_string(),
            lock,
        })
    }

    /// Threads with a live write lock entry.
    #[cfg(test)]
    fn tracked_threads(&self) -> usize {
        self.thread_locks.lock().map_or(0, |locks| locks.len())
    }

    /// Append one message and return its id.
    ///
    /// May schedule a background summarization; that never delays or fails
    /// this call.
    pub async fn append(
        &self,
        thread_id: &str,
        role: Role,
        content: &str,
        metadata: MessageMetadata,
    ) -> Result<i64, MemoryError> {
        let lease = self.thread_lock(thread_id)?;
        let _guard = lease.lock().await;

        let message = self
            .repo
            .append_message(thread_id, role, content, &metadata, Timestamp::now())?;
        tracing::debug!(thread_id, message_id = message.id, role = %role, "Message appended");

        if let Err(e) = self.check_watermark(thread_id, message.created_at) {
            tracing::warn!(thread_id, error = %e, "Summarization watermark check failed");
        }
        Ok(message.id)
    }

    /// Append several messages as one serialized unit (a user turn and its
    /// answer). Returns the ids in order.
    pub async fn append_all(
        &self,
        thread_id: &str,
        entries: Vec<(Role, String, MessageMetadata)>,
    ) -> Result<Vec<i64>, MemoryError> {
        let lease = self.thread_lock(thread_id)?;
        let _guard = lease.lock().await;

        let mut ids = Vec::with_capacity(entries.len());
        let mut last = None;
        for (role, content, metadata) in entries {
            let message = self
                .repo
                .append_message(thread_id, role, &content, &metadata, Timestamp::now())?;
            ids.push(message.id);
            last = Some(message.created_at);
            // Each append gets its own check so a threshold crossed mid-batch
            // still summarizes exactly the first `threshold` messages.
            if let Err(e) = self.check_watermark(thread_id, message.created_at) {
                tracing::warn!(thread_id, error = %e, "Summarization watermark check failed");
            }
        }
        if let Some(ts) = last {
            tracing::debug!(thread_id, count = ids.len(), last = ts.0, "Messages appended");
        }
        Ok(ids)
    }

    /// Must be called with the thread's write lock held.
    fn check_watermark(&self, thread_id: &str, latest: Timestamp) -> Result<(), MemoryError> {
        if !self.config.summarization_enabled {
            return Ok(());
        }
        let Some(mark) = self.repo.watermark(thread_id)? else {
            return Ok(());
        };
        let unsummarized = self.repo.count_after(thread_id, mark)?;
        if unsummarized < self.config.summarize_threshold as u64 {
            return Ok(());
        }

        let Some(guard) = self.claim(thread_id) else {
            tracing::debug!(thread_id, "Summarization already in flight");
            return Ok(());
        };

        tracing::info!(thread_id, unsummarized, "Summarization threshold reached");
        let repo = self.repo.clone();
        let summarizer = Arc::clone(&self.summarizer);
        let thread = thread_id.to_string();

        let mut background = self
            .background
            .lock()
            .map_err(|e| MemoryError::Summarization(format!("task set poisoned: {}", e)))?;
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            let _guard = guard;
            match summarize_range(&repo, &summarizer, &thread, mark, latest).await {
                Ok(Some(summary)) => tracing::info!(
                    thread_id = %thread,
                    summary_id = summary.id,
                    messages = summary.message_count,
                    "Conversation summarized"
                ),
                Ok(None) => tracing::debug!(thread_id = %thread, "Summary superseded, skipped"),
                Err(e) => tracing::warn!(thread_id = %thread, error = %e, "Background summarization failed"),
            }
        });
        Ok(())
    }

    fn claim(&self, thread_id: &str) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(thread_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            thread_id: thread_id.to_string(),
        })
    }

    /// Summarize everything not yet summarized, in the foreground.
    ///
    /// Returns `None` when there is nothing to summarize or a background run
    /// for the thread is already in progress.
    pub async fn summarize_now(&self, thread_id: &str) -> Result<Option<ConversationSummary>, MemoryError> {
        let snapshot = {
            let lease = self.thread_lock(thread_id)?;
            let _guard = lease.lock().await;
            let Some(mark) = self.repo.watermark(thread_id)? else {
                return Ok(None);
            };
            let latest = self.repo.recent_messages(thread_id, 1)?;
            match latest.last() {
                Some(last) if last.created_at > mark => (mark, last.created_at),
                _ => return Ok(None),
            }
        };

        let Some(_guard) = self.claim(thread_id) else {
            return Ok(None);
        };
        summarize_range(&self.repo, &self.summarizer, thread_id, snapshot.0, snapshot.1).await
    }

    /// Wait for every scheduled summarization to finish.
    pub async fn drain_background(&self) {
        let mut tasks = match self.background.lock() {
            Ok(mut set) => std::mem::take(&mut *set),
            Err(_) => return,
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Summarization task did not complete");
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The most recent `limit` messages in chronological order, or the
    /// enriched view when `enrich` is set.
    pub fn history(&self, thread_id: &str, limit: u32, enrich: bool) -> Result<History, MemoryError> {
        if enrich {
            Ok(History::Enriched(self.enriched_history(thread_id, limit)?))
        } else {
            Ok(History::Messages(self.recent(thread_id, limit)?))
        }
    }

    pub fn recent(&self, thread_id: &str, limit: u32) -> Result<Vec<Message>, MemoryError> {
        Ok(self.repo.recent_messages(thread_id, limit)?)
    }

    pub fn enriched_history(&self, thread_id: &str, limit: u32) -> Result<EnrichedHistory, MemoryError> {
        let thread = self.repo.find_thread(thread_id)?;
        Ok(EnrichedHistory {
            summaries: self.repo.summaries(thread_id)?,
            recent_messages: self.repo.recent_messages(thread_id, limit)?,
            total_messages: self.repo.count_messages(thread_id)?,
            conversation_started: thread.map(|t| t.created_at),
        })
    }

    pub fn summaries(&self, thread_id: &str) -> Result<Vec<ConversationSummary>, MemoryError> {
        Ok(self.repo.summaries(thread_id)?)
    }

    /// `None` until the thread has at least one summary.
    pub fn insights(&self, thread_id: &str) -> Result<Option<ConversationInsights>, MemoryError> {
        let summaries = self.repo.summaries(thread_id)?;
        Ok(ConversationInsights::from_summaries(&summaries, self.config.max_topics))
    }

    pub fn thread_exists(&self, thread_id: &str) -> Result<bool, MemoryError> {
        Ok(self.repo.find_thread(thread_id)?.is_some())
    }
}

async fn summarize_range(
    repo: &ConversationRepository,
    summarizer: &Summarizer,
    thread_id: &str,
    start: Timestamp,
    end: Timestamp,
) -> Result<Option<ConversationSummary>, MemoryError> {
    let messages = repo.messages_in_range(thread_id, start, end)?;
    if messages.is_empty() {
        return Ok(None);
    }

    let draft = summarizer.summarize(&messages).await;
    let summary = NewSummary {
        thread_id: thread_id.to_string(),
        summary_text: draft.text,
        topics: draft.topics,
        sentiment: draft.sentiment,
        message_count: messages.len() as u32,
        start_ts: start,
        end_ts: end,
    };
    Ok(repo.insert_summary_if_contiguous(&summary, Timestamp::now())?)
}
