//! Domain layer containing the realtime vocabulary.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (ids, timestamps, errors, state machines)
//! - `realtime` - Connection state, wire events/commands, history and cache types

pub mod foundation;
pub mod realtime;
