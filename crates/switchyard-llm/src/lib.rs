//! Reasoning providers: an OpenAI-compatible HTTP client and a scripted
//! in-process provider for tests and offline runs.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiProvider;
pub use scripted::{Reply, ScriptedProvider};
