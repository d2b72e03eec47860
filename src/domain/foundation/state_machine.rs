//! State machine trait for status enums.
//!
//! Gives lifecycle enums (connection status, presence status) one way to
//! declare and check their legal transitions.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors list the legal moves; `transition_to` and `is_terminal`
/// come for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for ConnectionStatus {
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Disconnected => vec![Connecting, Error],
///             Connecting => vec![Connected, Disconnected, Error],
///             // ...
///         }
///     }
/// }
///
/// let next = status.transition_to(ConnectionStatus::Connected)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns all valid target states from the current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns true if a transition from self to target is valid.
    ///
    /// Staying in the same state is never a transition.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Performs the transition, returning an error if it is not allowed.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if the current state has no outgoing transitions.
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
