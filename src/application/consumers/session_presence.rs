//! Presence view of one training session.
//!
//! # Membership
//!
//! The adapter takes one unit of room interest when it is mounted and gives
//! it back exactly once on teardown. If the connection is down at mount
//! time the join is recorded but not sent; the connection replays it on the
//! next successful connect.
//!
//! # Status
//!
//! ```text
//! Loading ──▶ Connected ⇄ Disconnected
//!    └──────────┴─────────────┴──▶ Error (connection gave up)
//! ```

use serde::Serialize;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::adapters::events::Subscription;
use crate::application::connection::TransportConnection;
use crate::domain::foundation::{ConsumerId, SessionId, StateMachine, Timestamp};
use crate::domain::realtime::events::names;
use crate::domain::realtime::{
    BoundedHistoryBuffer, ConnectionState, ConnectionStatus, InboundEvent, SessionInfo,
    SessionUpdate, SessionUpdateType,
};

use super::ConsumerAdapter;

/// Tunables for a presence adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceSettings {
    /// Updates kept in the view's recent list.
    pub recent_update_limit: usize,
    /// Delay between becoming connected and asking for a session snapshot.
    pub info_request_delay: Duration,
    /// How recent `last_activity` must be to count as active.
    pub activity_window: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            recent_update_limit: 10,
            info_request_delay: Duration::from_millis(100),
            activity_window: Duration::from_secs(60),
        }
    }
}

/// Presence lifecycle as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Loading,
    Connected,
    Disconnected,
    Error,
}

impl StateMachine for PresenceStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use PresenceStatus::*;
        match self {
            Loading => vec![Connected, Disconnected, Error],
            Connected => vec![Disconnected, Error],
            Disconnected => vec![Connected, Error],
            Error => vec![Connected, Disconnected],
        }
    }
}

/// Read-only snapshot handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPresenceView {
    pub session_id: SessionId,
    pub participant_count: u32,
    pub is_joined: bool,
    pub last_activity: Option<Timestamp>,
    /// Most recent first.
    pub recent_updates: Vec<SessionUpdate>,
    pub status: PresenceStatus,
}

struct PresenceState {
    participant_count: u32,
    is_joined: bool,
    last_activity: Option<Timestamp>,
    recent_updates: BoundedHistoryBuffer<SessionUpdate>,
    status: PresenceStatus,
}

struct PresenceInner {
    id: ConsumerId,
    session_id: SessionId,
    connection: Arc<TransportConnection>,
    settings: PresenceSettings,
    state: Mutex<PresenceState>,
    subscriptions: Mutex<Vec<Subscription>>,
    info_request: Mutex<Option<JoinHandle<()>>>,
    auto_joined: AtomicBool,
    /// Units taken through `join_session` and not yet given back.
    manual_joins: AtomicUsize,
    torn_down: AtomicBool,
}

/// Presence adapter for one session room.
pub struct SessionPresence {
    inner: Arc<PresenceInner>,
}

impl SessionPresence {
    /// Register listeners and take room interest for `session_id`.
    pub fn mount(
        connection: Arc<TransportConnection>,
        session_id: SessionId,
        settings: PresenceSettings,
    ) -> Self {
        let inner = Arc::new(PresenceInner {
            id: ConsumerId::new(),
            session_id,
            connection: Arc::clone(&connection),
            settings,
            state: Mutex::new(PresenceState {
                participant_count: 0,
                is_joined: false,
                last_activity: None,
                recent_updates: BoundedHistoryBuffer::new(settings.recent_update_limit),
                status: PresenceStatus::Loading,
            }),
            subscriptions: Mutex::new(Vec::new()),
            info_request: Mutex::new(None),
            auto_joined: AtomicBool::new(false),
            manual_joins: AtomicUsize::new(0),
            torn_down: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::with_capacity(5);
        for event_name in [
            names::SESSION_UPDATE,
            names::SESSION_INFO,
            names::SESSION_JOINED,
            names::SESSION_LEFT,
        ] {
            let weak = Arc::downgrade(&inner);
            subscriptions.push(connection.on(event_name, move |event| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(event);
                }
                Ok(())
            }));
        }

        let weak = Arc::downgrade(&inner);
        subscriptions.push(connection.on_state_change(move |state| {
            if let Some(inner) = weak.upgrade() {
                inner.on_connection_state(state);
            }
            Ok(())
        }));
        *inner.subscriptions() = subscriptions;

        inner.auto_join();

        let current = connection.state();
        if current.status != ConnectionStatus::Connecting {
            inner.on_connection_state(&current);
        }

        tracing::debug!(consumer_id = %inner.id, session_id = %inner.session_id, "Session presence mounted");
        Self { inner }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Current view snapshot.
    pub fn view(&self) -> SessionPresenceView {
        let state = self.inner.state();
        SessionPresenceView {
            session_id: self.inner.session_id.clone(),
            participant_count: state.participant_count,
            is_joined: state.is_joined,
            last_activity: state.last_activity,
            recent_updates: state.recent_updates.snapshot(|_| true),
            status: state.status,
        }
    }

    pub fn status(&self) -> PresenceStatus {
        self.inner.state().status
    }

    pub fn participant_count(&self) -> u32 {
        self.inner.state().participant_count
    }

    pub fn is_joined(&self) -> bool {
        self.inner.state().is_joined
    }

    // === Manual controls ===

    /// Take an extra unit of room interest. Pair with `leave_session`.
    ///
    /// Returns whether a `joinSession` command went out. Ignored after teardown.
    pub fn join_session(&self) -> bool {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.manual_joins.fetch_add(1, Ordering::SeqCst);
        self.inner.connection.join_room(&self.inner.session_id)
    }

    /// Give back one unit taken by `join_session`.
    ///
    /// Only this adapter's own manual joins can be released; with none
    /// outstanding this is a no-op returning `false`.
    pub fn leave_session(&self) -> bool {
        let released = self
            .inner
            .manual_joins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !released {
            return false;
        }
        self.inner.connection.leave_room(&self.inner.session_id)
    }

    pub fn refresh_session_info(&self) -> bool {
        self.inner.connection.request_session_info(&self.inner.session_id)
    }

    /// Ask for a snapshot and wait for the answer.
    ///
    /// `None` when not connected or when no answer arrives within `timeout`.
    pub async fn fetch_session_info(&self, timeout: Duration) -> Option<SessionInfo> {
        let (tx, rx) = oneshot::channel();
        let reply = Mutex::new(Some(tx));
        let session_id = self.inner.session_id.clone();

        let _subscription = self.inner.connection.on(names::SESSION_INFO, move |event| {
            if let InboundEvent::SessionInfo(info) = event {
                if info.session_id == session_id {
                    let sender = reply.lock().unwrap_or_else(|e| e.into_inner()).take();
                    if let Some(sender) = sender {
                        let _ = sender.send(info.clone());
                    }
                }
            }
            Ok(())
        });

        if !self.refresh_session_info() {
            return None;
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(info)) => Some(info),
            _ => {
                tracing::debug!(session_id = %self.inner.session_id, "Session info request timed out");
                None
            }
        }
    }

    // === Derived queries ===

    pub fn participant_updates(&self) -> Vec<SessionUpdate> {
        self.inner
            .state()
            .recent_updates
            .snapshot(|u| u.update_type.is_participant_change())
    }

    pub fn status_updates(&self) -> Vec<SessionUpdate> {
        self.inner
            .state()
            .recent_updates
            .snapshot(|u| u.update_type.is_status_change())
    }

    pub fn reward_updates(&self) -> Vec<SessionUpdate> {
        self.inner
            .state()
            .recent_updates
            .snapshot(|u| u.update_type.is_reward())
    }

    /// Latest update for this session from the connection's shared history.
    pub fn latest_update(&self) -> Option<SessionUpdate> {
        self.inner.connection.latest_session_update(&self.inner.session_id)
    }

    /// Whether something happened in the session within the activity window.
    pub fn has_recent_activity(&self, now: &Timestamp) -> bool {
        self.inner
            .state()
            .last_activity
            .is_some_and(|at| at.is_within(self.inner.settings.activity_window, now))
    }
}

impl ConsumerAdapter for SessionPresence {
    fn consumer_id(&self) -> ConsumerId {
        self.inner.id
    }

    fn teardown(&self) {
        self.inner.teardown();
    }

    fn is_active(&self) -> bool {
        !self.inner.torn_down.load(Ordering::SeqCst)
    }
}

impl Drop for SessionPresence {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl std::fmt::Debug for SessionPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPresence")
            .field("consumer_id", &self.inner.id)
            .field("session_id", &self.inner.session_id)
            .field("status", &self.status())
            .finish()
    }
}

impl PresenceInner {
    fn state(&self) -> MutexGuard<'_, PresenceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn auto_join(&self) {
        if self.auto_joined.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connection.join_room(&self.session_id);
    }

    fn set_status(state: &mut PresenceState, next: PresenceStatus) {
        if state.status != next && state.status.can_transition_to(&next) {
            state.status = next;
        }
    }

    fn on_connection_state(self: &Arc<Self>, connection: &ConnectionState) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        match connection.status {
            ConnectionStatus::Connected => {
                {
                    let mut state = self.state();
                    Self::set_status(&mut state, PresenceStatus::Connected);
                    state.is_joined = true;
                }
                self.schedule_info_request();
            }
            ConnectionStatus::Disconnected => {
                let mut state = self.state();
                Self::set_status(&mut state, PresenceStatus::Disconnected);
                state.is_joined = false;
            }
            ConnectionStatus::Error => {
                let mut state = self.state();
                Self::set_status(&mut state, PresenceStatus::Error);
                state.is_joined = false;
            }
            ConnectionStatus::Connecting => {}
        }
    }

    fn schedule_info_request(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            self.connection.request_session_info(&self.session_id);
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let delay = self.settings.info_request_delay;
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if !inner.torn_down.load(Ordering::SeqCst) {
                    inner.connection.request_session_info(&inner.session_id);
                }
            }
        });

        let previous = self
            .info_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn on_event(&self, event: &InboundEvent) {
        if event.session_id() != Some(&self.session_id) {
            return;
        }

        let mut state = self.state();
        match event {
            InboundEvent::SessionUpdate(update) => {
                state.last_activity = Some(update.timestamp);
                let current = state.participant_count;
                match update.update_type {
                    SessionUpdateType::ParticipantJoined => {
                        state.participant_count = update
                            .participant_count()
                            .unwrap_or_else(|| current.saturating_add(1));
                    }
                    SessionUpdateType::ParticipantLeft => {
                        state.participant_count = update
                            .participant_count()
                            .unwrap_or_else(|| current.saturating_sub(1));
                    }
                    _ => {}
                }
                state.recent_updates.push(update.clone());
            }
            InboundEvent::SessionInfo(info) => {
                state.participant_count = info.participant_count;
                state.is_joined = info.is_connected;
                state.last_activity = info.last_activity;
            }
            InboundEvent::SessionJoined(joined) => {
                if let Some(count) = joined.participant_count {
                    state.participant_count = count;
                }
                state.is_joined = true;
                state.last_activity = Some(joined.timestamp);
            }
            InboundEvent::SessionLeft(left) => {
                state.is_joined = false;
                state.last_activity = Some(left.timestamp);
            }
            _ => {}
        }
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let subscriptions = mem::take(&mut *self.subscriptions());
        drop(subscriptions);

        if let Some(task) = self
            .info_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }

        let outstanding = self.manual_joins.swap(0, Ordering::SeqCst);
        for _ in 0..outstanding {
            self.connection.leave_room(&self.session_id);
        }
        if self.auto_joined.load(Ordering::SeqCst) {
            self.connection.leave_room(&self.session_id);
        }
        tracing::debug!(
            consumer_id = %self.id,
            session_id = %self.session_id,
            manual_joins_released = outstanding,
            "Session presence torn down"
        );
    }
}
