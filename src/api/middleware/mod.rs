//! API middleware.
//!
//! Execution order (outermost to innermost):
//! 1. Audit logger, on every route
//! 2. Idempotency, on submit and review
//! 3. Actor resolver, on routes that act as a reviewer

pub mod actor;
pub mod audit;
pub mod idempotency;
