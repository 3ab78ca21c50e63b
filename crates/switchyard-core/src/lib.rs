pub mod catalog;
pub mod config;
pub mod error;
pub mod reasoning;
pub mod types;

pub use catalog::{CatalogConfig, HandlerProfile, SharedEntity};
pub use config::SwitchyardConfig;
pub use error::{Result, SwitchyardError};
pub use reasoning::{invoke_bounded, ReasoningError, ReasoningProvider, ReasoningRequest};
pub use types::*;
