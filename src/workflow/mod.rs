//! ATP review workflow: classification, approval paths, punchlist severity,
//! stage transitions and SLA deadlines.

pub mod catalog;
pub mod classify;
pub mod engine;
pub mod error;
pub mod path;
pub mod severity;
pub mod sla;
pub mod transition;
pub mod types;

pub use catalog::WorkflowCatalog;
pub use engine::WorkflowService;
pub use error::WorkflowError;
pub use types::*;
