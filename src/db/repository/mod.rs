//! Repository layer, one sub-module per table.
//!
//! Functions take a borrowed `Connection` so callers can run several of them
//! inside one transaction.

mod document;
mod punchlist;
mod review_stage;
mod stage_event;

use uuid::Uuid;

use super::DatabaseError;

pub use document::*;
pub use punchlist::*;
pub use review_stage::*;
pub use stage_event::*;

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("invalid UUID '{raw}': {e}")))
}
