//! Event delivery adapters.
//!
//! - `EventDispatcher` - synchronous, name-keyed fan-out with listener isolation
//! - `Subscription` - RAII handle that removes its listener on drop

mod dispatcher;

pub use dispatcher::{EventDispatcher, Listener, ListenerFn, Subscription};
