//! Switchyard Storage crate - SQLite persistence for conversations.
//!
//! Provides a WAL-mode SQLite database with migrations and an append-only
//! repository for threads, messages and summaries.

pub mod conversations;
pub mod db;
pub mod migrations;

pub use conversations::{ConversationRepository, NewSummary};
pub use db::Database;
