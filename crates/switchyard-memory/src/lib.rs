//! Switchyard Memory crate - the conversation store and its summarization
//! lifecycle.
//!
//! - Append-only message log per thread with serialized per-thread writes
//! - Watermark-triggered background summarization
//! - Enriched history (summaries plus recent messages) and insights

pub mod error;
pub mod insights;
pub mod store;
pub mod summarizer;
pub mod topics;

pub use error::MemoryError;
pub use insights::{ConversationInsights, TopicCount};
pub use store::{ConversationStore, EnrichedHistory, History};
pub use summarizer::{SummaryDraft, Summarizer};
pub use topics::TopicExtractor;
