//! Routing for Switchyard.
//!
//! Classifies queries onto specialist handlers, scores routing confidence
//! from the catalog tables, and coordinates multi-handler collaboration.

pub mod classifier;
pub mod collaboration;
pub mod confidence;
pub mod data;
pub mod error;
pub mod filter;
pub mod handler;
pub mod tables;

pub use classifier::{ClassificationContext, Classifier};
pub use collaboration::{
    CollaborationCoordinator, CollaborationDetector, CollaborationKind, CollaborationOutcome,
    CollaborationPlan, Synthesis,
};
pub use confidence::{score, Confidence, ConfidenceBasis};
pub use data::{DomainDataProvider, SharedDataProvider, StaticDataProvider};
pub use error::{ClassificationError, CollaborationError, DataError, HandlerError, SynthesisError};
pub use filter::ContentFilter;
pub use handler::{invoke_handler, Handler, HandlerContext, HandlerRegistry, LineSpecialist};
pub use tables::RoutingTables;
