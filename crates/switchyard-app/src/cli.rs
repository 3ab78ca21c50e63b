//! CLI argument definitions for the Switchyard binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Switchyard: a London Underground travel assistant that routes each
/// question to the right line specialist.
#[derive(Parser, Debug)]
#[command(name = "switchyard", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite conversation store.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Answer with the built-in scripted provider instead of the network.
    #[arg(long = "offline", global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Ask a question.
    Ask {
        /// The question, e.g. "Is the Victoria line running?"
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Conversation thread to continue. A new one is started if omitted.
        #[arg(short = 't', long = "thread")]
        thread: Option<String>,

        /// Approve the answer a handler proposed in the previous turn.
        #[arg(long = "confirm", value_name = "HANDLER", conflicts_with = "reject")]
        confirm: Option<String>,

        /// Decline the answer a handler proposed and ask another line.
        #[arg(long = "reject", value_name = "HANDLER")]
        reject: Option<String>,

        /// Print the full result as JSON.
        #[arg(long = "json")]
        json: bool,
    },
    /// Show a thread's messages.
    History {
        #[arg(short = 't', long = "thread")]
        thread: String,

        /// Most recent messages to show.
        #[arg(short = 'n', long = "limit")]
        limit: Option<u32>,

        /// Include summaries of older messages.
        #[arg(long = "enrich")]
        enrich: bool,
    },
    /// Show aggregate topics and sentiment for a thread.
    Insights {
        #[arg(short = 't', long = "thread")]
        thread: String,
    },
    /// Summarize whatever a thread has not yet summarized.
    Summarize {
        #[arg(short = 't', long = "thread")]
        thread: String,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SWITCHYARD_CONFIG env var > ~/.switchyard/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SWITCHYARD_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Returns `None` when the flag is absent (use the config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".switchyard").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".switchyard").join("config.toml");
    }
    PathBuf::from("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ask_joins_words() {
        let args = CliArgs::try_parse_from(["switchyard", "ask", "Circle", "line", "status", "-t", "abc"]).unwrap();
        match args.command {
            Command::Ask { query, thread, .. } => {
                assert_eq!(query.join(" "), "Circle line status");
                assert_eq!(thread.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from(["switchyard", "insights", "--thread", "t1", "--offline", "-c", "/tmp/s.toml"])
            .unwrap();
        assert!(args.offline);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/s.toml"));
        assert_eq!(args.command, Command::Insights { thread: "t1".into() });
    }

    #[test]
    fn test_confirm_and_reject_conflict() {
        let result = CliArgs::try_parse_from([
            "switchyard", "ask", "q", "--confirm", "VICTORIA", "--reject", "VICTORIA",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_history_requires_thread() {
        assert!(CliArgs::try_parse_from(["switchyard", "history"]).is_err());
        let args = CliArgs::try_parse_from(["switchyard", "history", "-t", "t1", "-n", "5", "--enrich"]).unwrap();
        assert_eq!(
            args.command,
            Command::History {
                thread: "t1".into(),
                limit: Some(5),
                enrich: true
            }
        );
    }
}
