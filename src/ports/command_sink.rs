//! CommandSink port - where room commands go.
//!
//! The room manager decides *whether* a command is due; the sink decides
//! whether it can be delivered right now. Keeping the two apart lets the
//! manager be tested with a recording sink and lets the connection own
//! the real outbound link.

use crate::domain::realtime::OutboundCommand;

/// Synchronous, non-blocking command delivery.
pub trait CommandSink: Send + Sync {
    /// Try to deliver a command.
    ///
    /// Returns `false` when there is no live link. Callers treat that as
    /// "deferred until the next connect", never as a failure.
    fn send(&self, command: &OutboundCommand) -> bool;

    /// Whether a live link is attached.
    fn is_open(&self) -> bool;
}
