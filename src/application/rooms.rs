//! Reference-counted room membership.
//!
//! Any number of consumers may want the same session room. The manager
//! keeps one count per room and only talks to the event service on the
//! edges:
//!
//! ```text
//! join:   0 → 1   sends joinSession
//! leave:  1 → 0   sends leaveSession, room forgotten
//! ```
//!
//! Every other call is bookkeeping. Sends go through a `CommandSink`; a
//! send that fails because the link is down is deferred intent, and the
//! connection replays every tracked room with `replay_after` on the next
//! successful connect.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::foundation::SessionId;
use crate::domain::realtime::OutboundCommand;
use crate::ports::CommandSink;

/// Snapshot of one tracked room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: SessionId,
    pub ref_count: usize,
}

/// Tracks how many consumers want each room.
///
/// # Thread Safety
///
/// One mutex guards the counts. Commands are issued while it is held, so
/// a `join` racing `replay_after` can neither be lost nor doubled.
pub struct RoomSubscriptionManager {
    rooms: Mutex<BTreeMap<SessionId, usize>>,
    sink: Arc<dyn CommandSink>,
}

impl RoomSubscriptionManager {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            rooms: Mutex::new(BTreeMap::new()),
            sink,
        }
    }

    fn rooms(&self) -> MutexGuard<'_, BTreeMap<SessionId, usize>> {
        self.rooms.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register interest in `room`.
    ///
    /// Returns whether a `joinSession` command was actually sent, which
    /// only happens on the 0 → 1 transition while a link is open.
    pub fn join(&self, room: &SessionId) -> bool {
        let mut rooms = self.rooms();
        let count = rooms.entry(room.clone()).or_insert(0);
        *count += 1;

        if *count > 1 {
            tracing::trace!(session_id = %room, ref_count = *count, "Room interest added");
            return false;
        }

        let sent = self.sink.send(&OutboundCommand::join(room));
        tracing::debug!(session_id = %room, sent, "Room joined");
        sent
    }

    /// Drop one unit of interest in `room`.
    ///
    /// Unknown rooms are a no-op. Returns whether a `leaveSession` command
    /// was actually sent, which only happens on the 1 → 0 transition while
    /// a link is open.
    pub fn leave(&self, room: &SessionId) -> bool {
        let mut rooms = self.rooms();
        let Some(count) = rooms.get_mut(room) else {
            tracing::trace!(session_id = %room, "Leave for untracked room ignored");
            return false;
        };

        *count -= 1;
        if *count > 0 {
            tracing::trace!(session_id = %room, ref_count = *count, "Room interest released");
            return false;
        }

        rooms.remove(room);
        let sent = self.sink.send(&OutboundCommand::leave(room));
        tracing::debug!(session_id = %room, sent, "Room left");
        sent
    }

    /// Run `attach`, then send one `joinSession` per tracked room.
    ///
    /// Both happen under the membership lock. When `attach` returns `false`
    /// nothing is replayed. Returns how many joins were sent.
    pub fn replay_after<F: FnOnce() -> bool>(&self, attach: F) -> usize {
        let rooms = self.rooms();
        if !attach() {
            return 0;
        }

        let sent = rooms
            .keys()
            .filter(|room| self.sink.send(&OutboundCommand::join(room)))
            .count();

        if !rooms.is_empty() {
            tracing::info!(rooms = rooms.len(), sent, "Replayed room membership");
        }
        sent
    }

    /// Current reference count, 0 for untracked rooms.
    pub fn ref_count(&self, room: &SessionId) -> usize {
        self.rooms().get(room).copied().unwrap_or(0)
    }

    pub fn is_tracked(&self, room: &SessionId) -> bool {
        self.rooms().contains_key(room)
    }

    /// Tracked rooms, ordered by id.
    pub fn rooms_snapshot(&self) -> Vec<Room> {
        self.rooms()
            .iter()
            .map(|(id, ref_count)| Room {
                id: id.clone(),
                ref_count: *ref_count,
            })
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms().len()
    }
}

impl std::fmt::Debug for RoomSubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomSubscriptionManager")
            .field("rooms", &*self.rooms())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sink that records successful sends and can be opened/closed.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        open: AtomicBool,
        sent: Mutex<Vec<OutboundCommand>>,
    }

    impl RecordingSink {
        pub(crate) fn open() -> Arc<Self> {
            let sink = Arc::new(Self::default());
            sink.set_open(true);
            sink
        }

        pub(crate) fn closed() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub(crate) fn set_open(&self, open: bool) {
            self.open.store(open, Ordering::SeqCst);
        }

        pub(crate) fn sent(&self) -> Vec<OutboundCommand> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, name: &str, room: &str) -> usize {
            self.sent()
                .iter()
                .filter(|c| c.name() == name && c.session_id().as_str() == room)
                .count()
        }
    }

    impl CommandSink for RecordingSink {
        fn send(&self, command: &OutboundCommand) -> bool {
            if !self.is_open() {
                return false;
            }
            self.sent.lock().unwrap().push(command.clone());
            true
        }

        fn is_open(&self) -> bool {
            self.open.load(Ordering::SeqCst)
        }
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    #[test]
    fn first_join_sends_and_second_only_counts() {
        let sink = RecordingSink::open();
        let rooms = RoomSubscriptionManager::new(sink.clone());

        assert!(rooms.join(&sid("a")));
        assert!(!rooms.join(&sid("a")));

        assert_eq!(rooms.ref_count(&sid("a")), 2);
        assert_eq!(sink.count("joinSession", "a"), 1);
    }

    #[test]
    fn last_leave_sends_and_forgets_room() {
        let sink = RecordingSink::open();
        let rooms = RoomSubscriptionManager::new(sink.clone());
        rooms.join(&sid("a"));
        rooms.join(&sid("a"));

        assert!(!rooms.leave(&sid("a")));
        assert!(rooms.is_tracked(&sid("a")));
        assert!(rooms.leave(&sid("a")));
        assert!(!rooms.is_tracked(&sid("a")));
        assert_eq!(sink.count("leaveSession", "a"), 1);
    }

    #[test]
    fn leave_of_unknown_room_is_noop() {
        let sink = RecordingSink::open();
        let rooms = RoomSubscriptionManager::new(sink.clone());

        assert!(!rooms.leave(&sid("ghost")));
        assert!(!rooms.leave(&sid("ghost")));
        assert!(sink.sent().is_empty());
        assert_eq!(rooms.ref_count(&sid("ghost")), 0);
    }

    #[test]
    fn join_while_closed_is_tracked_but_not_sent() {
        let sink = RecordingSink::closed();
        let rooms = RoomSubscriptionManager::new(sink.clone());

        assert!(!rooms.join(&sid("s1")));
        assert_eq!(rooms.ref_count(&sid("s1")), 1);
        assert!(sink.sent().is_empty());
    }

    #[test]
    fn replay_sends_one_join_per_room_after_attach() {
        let sink = RecordingSink::closed();
        let rooms = RoomSubscriptionManager::new(sink.clone());
        rooms.join(&sid("a"));
        rooms.join(&sid("a"));
        rooms.join(&sid("b"));

        let replayed = rooms.replay_after(|| {
            sink.set_open(true);
            true
        });

        assert_eq!(replayed, 2);
        assert_eq!(sink.count("joinSession", "a"), 1);
        assert_eq!(sink.count("joinSession", "b"), 1);
    }

    #[test]
    fn replay_with_link_still_down_sends_nothing() {
        let sink = RecordingSink::closed();
        let rooms = RoomSubscriptionManager::new(sink.clone());
        rooms.join(&sid("a"));

        assert_eq!(rooms.replay_after(|| true), 0);
        assert_eq!(rooms.ref_count(&sid("a")), 1);
    }

    #[test]
    fn rejected_attach_skips_replay() {
        let sink = RecordingSink::open();
        let rooms = RoomSubscriptionManager::new(sink.clone());
        rooms.join(&sid("a"));

        assert_eq!(rooms.replay_after(|| false), 0);
        assert_eq!(sink.count("joinSession", "a"), 1);
    }

    #[test]
    fn rapid_join_leave_join() {
        let sink = RecordingSink::open();
        let rooms = RoomSubscriptionManager::new(sink.clone());

        rooms.join(&sid("a"));
        rooms.leave(&sid("a"));
        rooms.join(&sid("a"));

        assert_eq!(rooms.ref_count(&sid("a")), 1);
        assert_eq!(sink.count("joinSession", "a"), 2);
        assert_eq!(sink.count("leaveSession", "a"), 1);
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let rooms = RoomSubscriptionManager::new(RecordingSink::open());
        rooms.join(&sid("b"));
        rooms.join(&sid("a"));
        rooms.join(&sid("b"));

        let snapshot = rooms.rooms_snapshot();
        assert_eq!(
            snapshot,
            vec![
                Room { id: sid("a"), ref_count: 1 },
                Room { id: sid("b"), ref_count: 2 },
            ]
        );
        assert_eq!(rooms.room_count(), 2);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Operation {
            Join(String),
            Leave(String),
            Connect,
            Disconnect,
        }

        fn room_strategy() -> impl Strategy<Value = String> {
            prop_oneof![Just("a".to_string()), Just("b".to_string()), Just("c".to_string())]
        }

        fn operation_strategy() -> impl Strategy<Value = Operation> {
            prop_oneof![
                4 => room_strategy().prop_map(Operation::Join),
                4 => room_strategy().prop_map(Operation::Leave),
                1 => Just(Operation::Connect),
                1 => Just(Operation::Disconnect),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(300))]

            /// Leaves never outnumber joins and counts match a simple model.
            #[test]
            fn prop_refcount_invariant(
                operations in prop::collection::vec(operation_strategy(), 1..80)
            ) {
                let sink = RecordingSink::closed();
                let rooms = RoomSubscriptionManager::new(sink.clone());
                let mut model: HashMap<String, usize> = HashMap::new();

                for op in &operations {
                    match op {
                        Operation::Join(room) => {
                            rooms.join(&sid(room));
                            *model.entry(room.clone()).or_insert(0) += 1;
                        }
                        Operation::Leave(room) => {
                            rooms.leave(&sid(room));
                            if let Some(count) = model.get_mut(room) {
                                *count -= 1;
                                if *count == 0 {
                                    model.remove(room);
                                }
                            }
                        }
                        Operation::Connect => {
                            if !sink.is_open() {
                                rooms.replay_after(|| {
                                    sink.set_open(true);
                                    true
                                });
                            }
                        }
                        Operation::Disconnect => sink.set_open(false),
                    }

                    for room in ["a", "b", "c"] {
                        let joins = sink.count("joinSession", room);
                        let leaves = sink.count("leaveSession", room);
                        prop_assert!(leaves <= joins, "{room}: {leaves} leaves > {joins} joins");
                        prop_assert_eq!(
                            rooms.ref_count(&sid(room)),
                            model.get(room).copied().unwrap_or(0)
                        );
                    }
                }
            }
        }
    }
}
