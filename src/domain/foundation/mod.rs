//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, and error types shared by the
//! realtime layer and its consumers.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ConsumerId, ListenerId, SessionId};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
