//! Business services layer.
//!
//! Services sit between the CLI and the infrastructure layer:
//!
//! ```text
//!        CLI commands
//!             |
//!             v
//!      Services Layer
//!             |
//!             v
//! Infrastructure (Providers, Storage)
//! ```
//!
//! - [`IngestService`]: pulls inbox messages into the local store
//! - [`ActionDispatcher`]: runs rules against the store and applies their actions

mod dispatch_service;
mod ingest_service;

pub use dispatch_service::{ActionDispatcher, ActionError, ActionReport, RuleReport, RunSummary};
pub use ingest_service::{IngestResult, IngestService};
