//! The shared transport connection.
//!
//! One `TransportConnection` per process owns the physical link to the
//! event service. Consumers never see the link: they register listeners,
//! ask for room membership, and read history through this type.
//!
//! # Lifecycle
//!
//! ```text
//! connect ─▶ Connecting ─▶ Connected ─(close)─▶ Disconnected ─(backoff)─▶ Connecting ...
//!                 │                                   │
//!                 └───────(open fails)────────────────┘
//!                                                     └─(attempts exhausted)─▶ Error
//! ```
//!
//! Each `connect` starts a supervisor task tagged with a fresh epoch. Every
//! state change the supervisor makes is fenced on that epoch, so a
//! supervisor that was cancelled while parked in I/O cannot overwrite the
//! state of its successor.
//!
//! # Observing state
//!
//! `state()` returns a snapshot, `watch_state()` a `tokio::sync::watch`
//! receiver (always the latest value), and `on_state_change` registers a
//! synchronous callback with the same isolation rules as event listeners.
//!
//! Callbacks run outside the control lock, one delivery at a time. Each
//! delivery hands out the state current at that moment, and whichever thread
//! is delivering keeps going until no newer change is pending. Listeners may
//! miss intermediate states under contention, but the last state they see is
//! always the connection's final one.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, TryLockError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::adapters::events::{EventDispatcher, Subscription};
use crate::adapters::websocket::codec::{decode_frame, encode_command};
use crate::domain::foundation::{DomainError, SessionId, StateMachine, Timestamp};
use crate::domain::realtime::{
    BoundedHistoryBuffer, ConnectionState, ConnectionStatus, Identity, InboundEvent,
    Notification, OutboundCommand, ReconnectPolicy, SessionUpdate,
    NOTIFICATION_HISTORY_CAPACITY, SESSION_UPDATE_HISTORY_CAPACITY,
};
use crate::ports::{CommandSink, Transport, TransportError, TransportFrame, TransportLink};

use super::rooms::RoomSubscriptionManager;

/// Event name used for connection state callbacks.
pub const STATE_CHANGED: &str = "stateChanged";

/// `last_error` once the reconnect budget is spent.
pub const ATTEMPTS_EXHAUSTED: &str = "reconnect attempts exhausted";

static GLOBAL: OnceCell<Arc<TransportConnection>> = OnceCell::new();

/// Tunables for the shared connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub reconnect: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub notification_capacity: usize,
    pub session_update_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_millis(5000),
            notification_capacity: NOTIFICATION_HISTORY_CAPACITY,
            session_update_capacity: SESSION_UPDATE_HISTORY_CAPACITY,
        }
    }
}

/// Outbound half of the current link.
///
/// Shared between the connection (which attaches and detaches links) and
/// the room manager (which sends through it), so neither has to hold the
/// other.
#[derive(Debug, Default)]
pub struct OutboundChannel {
    link: RwLock<Option<mpsc::UnboundedSender<String>>>,
}

impl OutboundChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn attach(&self, sender: mpsc::UnboundedSender<String>) {
        *self.link.write().unwrap_or_else(|e| e.into_inner()) = Some(sender);
    }

    /// Drop the current sender, which closes the link. Returns whether one was attached.
    fn detach(&self) -> bool {
        self.link
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }
}

impl CommandSink for OutboundChannel {
    fn send(&self, command: &OutboundCommand) -> bool {
        let link = self.link.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = link.as_ref() else {
            return false;
        };
        match encode_command(command) {
            Ok(text) => sender.send(text).is_ok(),
            Err(err) => {
                tracing::warn!(command = command.name(), error = %err, "Failed to encode command");
                false
            }
        }
    }

    fn is_open(&self) -> bool {
        self.link
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}

struct Control {
    identity: Option<Identity>,
    epoch: u64,
    supervisor: Option<JoinHandle<()>>,
    state: ConnectionState,
}

enum LinkEnd {
    Closed(String),
    Abandoned,
}

/// Process-wide connection to the event service.
pub struct TransportConnection {
    transport: Arc<dyn Transport>,
    settings: ConnectionSettings,
    outbound: Arc<OutboundChannel>,
    rooms: RoomSubscriptionManager,
    events: EventDispatcher<InboundEvent>,
    state_listeners: EventDispatcher<ConnectionState>,
    state_tx: watch::Sender<ConnectionState>,
    /// Bumped on every state change; drained by `notify`.
    state_changes: AtomicU64,
    /// Held by the thread currently delivering; remembers what it delivered.
    delivery: Mutex<Option<ConnectionState>>,
    control: Mutex<Control>,
    session_updates: Mutex<BoundedHistoryBuffer<SessionUpdate>>,
    notifications: Mutex<BoundedHistoryBuffer<Notification>>,
}

impl TransportConnection {
    pub fn new(transport: Arc<dyn Transport>, settings: ConnectionSettings) -> Arc<Self> {
        let outbound = Arc::new(OutboundChannel::new());
        let (state_tx, _) = watch::channel(ConnectionState::new());

        Arc::new(Self {
            transport,
            rooms: RoomSubscriptionManager::new(outbound.clone()),
            outbound,
            events: EventDispatcher::new(),
            state_listeners: EventDispatcher::new(),
            state_tx,
            state_changes: AtomicU64::new(0),
            delivery: Mutex::new(None),
            control: Mutex::new(Control {
                identity: None,
                epoch: 0,
                supervisor: None,
                state: ConnectionState::new(),
            }),
            session_updates: Mutex::new(BoundedHistoryBuffer::new(settings.session_update_capacity)),
            notifications: Mutex::new(BoundedHistoryBuffer::new(settings.notification_capacity)),
            settings,
        })
    }

    // === Process-wide slot ===

    /// Install `connection` as the process-wide instance.
    ///
    /// Returns the rejected connection if one is already installed.
    pub fn install_global(connection: Arc<Self>) -> Result<(), Arc<Self>> {
        GLOBAL.set(connection)
    }

    /// The process-wide instance, if installed.
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    // === Lifecycle ===

    /// Open the connection for `identity`.
    ///
    /// No-op while already connected or connecting as the same identity.
    /// A different identity tears the current link down first. From
    /// `Disconnected`, `Error`, or a pending backoff, a fresh supervisor
    /// starts with the attempt counter at zero.
    ///
    /// Returns whether a new connection attempt was started.
    pub fn connect(self: &Arc<Self>, identity: Identity) -> bool {
        {
            let control = self.control();
            let same_identity = control.identity.as_ref() == Some(&identity);
            if same_identity
                && matches!(
                    control.state.status,
                    ConnectionStatus::Connected | ConnectionStatus::Connecting
                )
            {
                tracing::debug!(user_id = %identity.user_id, "Already connected or connecting");
                return false;
            }
        }

        self.stop();

        let runtime = Handle::try_current();
        let epoch = self.apply(None, |control| {
            control.epoch += 1;
            if let Some(previous) = control.supervisor.take() {
                previous.abort();
            }
            control.identity = Some(identity.clone());
            control.state.attempt = 0;
            match &runtime {
                Ok(_) => control.state.status = ConnectionStatus::Connecting,
                Err(_) => {
                    control.state.status = ConnectionStatus::Error;
                    control.state.last_error = Some("no async runtime available".to_string());
                }
            }
            control.epoch
        });

        let (Some(epoch), Ok(runtime)) = (epoch, runtime) else {
            tracing::error!("connect called outside a tokio runtime");
            return false;
        };

        tracing::info!(user_id = %identity.user_id, epoch, "Connecting to event service");
        let task = runtime.spawn(supervise(Arc::downgrade(self), epoch, identity));

        let mut control = self.control();
        if control.epoch == epoch {
            control.supervisor = Some(task);
        } else {
            task.abort();
        }
        true
    }

    /// Reconnect with the last identity, e.g. after a terminal `Error`.
    pub fn reconnect(self: &Arc<Self>) -> bool {
        let identity = self.control().identity.clone();
        match identity {
            Some(identity) => self.connect(identity),
            None => false,
        }
    }

    /// Tear the link down. Idempotent.
    ///
    /// Room reference counts are kept; the next `connect` replays them.
    pub fn disconnect(&self) {
        if self.stop() {
            tracing::info!("Disconnected from event service");
        }
    }

    // Cancel the supervisor, release the link, and settle in Disconnected.
    fn stop(&self) -> bool {
        self.apply(None, |control| {
            control.epoch += 1;
            let had_supervisor = match control.supervisor.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            };
            let had_link = self.outbound.detach();
            control.state.attempt = 0;
            let was_active = control.state.status != ConnectionStatus::Disconnected;
            control.state.status = ConnectionStatus::Disconnected;
            had_supervisor || had_link || was_active
        })
        .unwrap_or(false)
    }

    // === State ===

    pub fn state(&self) -> ConnectionState {
        self.control().state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.control().state.is_connected()
    }

    /// Receiver that always holds the latest state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Call `callback` on every state change.
    pub fn on_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.state_listeners.on(STATE_CHANGED, callback)
    }

    /// Identity of the current or last connection.
    pub fn identity(&self) -> Option<Identity> {
        self.control().identity.clone()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    // === Commands ===

    /// Send a command over the current link. `false` when not connected.
    pub fn send(&self, command: &OutboundCommand) -> bool {
        let sent = self.outbound.send(command);
        if !sent {
            tracing::debug!(command = command.name(), "Command not sent: no open link");
        }
        sent
    }

    /// Ask the service for a `sessionInfo` snapshot.
    pub fn request_session_info(&self, session_id: &SessionId) -> bool {
        self.send(&OutboundCommand::session_info(session_id))
    }

    pub fn rooms(&self) -> &RoomSubscriptionManager {
        &self.rooms
    }

    pub fn join_room(&self, session_id: &SessionId) -> bool {
        self.rooms.join(session_id)
    }

    pub fn leave_room(&self, session_id: &SessionId) -> bool {
        self.rooms.leave(session_id)
    }

    // === Events ===

    /// Listen for inbound events named `event_name`.
    pub fn on<F>(&self, event_name: &str, callback: F) -> Subscription
    where
        F: Fn(&InboundEvent) -> Result<(), DomainError> + Send + Sync + 'static,
    {
        self.events.on(event_name, callback)
    }

    pub fn events(&self) -> &EventDispatcher<InboundEvent> {
        &self.events
    }

    // === History ===

    /// Most recent `sessionUpdate` for `session_id`.
    pub fn latest_session_update(&self, session_id: &SessionId) -> Option<SessionUpdate> {
        self.session_updates()
            .latest(|u| &u.session_id == session_id)
            .cloned()
    }

    /// Retained updates for `session_id`, most recent first.
    pub fn session_updates_for(&self, session_id: &SessionId) -> Vec<SessionUpdate> {
        self.session_updates()
            .snapshot(|u| &u.session_id == session_id)
    }

    pub fn recent_session_updates(&self) -> Vec<SessionUpdate> {
        self.session_updates().snapshot(|_| true)
    }

    /// Retained notifications (announcements included), most recent first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.notification_history().snapshot(|_| true)
    }

    /// Remove the notification at `index` (0 = most recent).
    pub fn remove_notification(&self, index: usize) -> Option<Notification> {
        self.notification_history().remove(index)
    }

    pub fn clear_notifications(&self) {
        self.notification_history().clear();
    }

    pub fn clear_session_updates(&self) {
        self.session_updates().clear();
    }

    // === Internals ===

    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session_updates(&self) -> MutexGuard<'_, BoundedHistoryBuffer<SessionUpdate>> {
        self.session_updates.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notification_history(&self) -> MutexGuard<'_, BoundedHistoryBuffer<Notification>> {
        self.notifications.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.control().epoch == epoch
    }

    /// Mutate control state and notify state listeners.
    ///
    /// With `Some(epoch)`, returns `None` without touching anything when
    /// the epoch is stale.
    fn apply<R>(&self, epoch: Option<u64>, f: impl FnOnce(&mut Control) -> R) -> Option<R> {
        let (result, changed) = self.apply_quiet(epoch, f)?;
        if changed {
            self.notify();
        }
        Some(result)
    }

    /// Like `apply`, but only reports whether the state changed instead of
    /// notifying. Used while other locks are held.
    fn apply_quiet<R>(
        &self,
        epoch: Option<u64>,
        f: impl FnOnce(&mut Control) -> R,
    ) -> Option<(R, bool)> {
        let mut control = self.control();
        if epoch.is_some_and(|e| e != control.epoch) {
            return None;
        }

        let before = control.state.clone();
        let result = f(&mut control);

        let (from, to) = (before.status, control.state.status);
        if from != to && !from.can_transition_to(&to) {
            tracing::warn!(from = %from, to = %to, "Rejected connection status transition");
            control.state.status = from;
        }

        if control.state == before {
            return Some((result, false));
        }
        self.state_tx.send_replace(control.state.clone());
        self.state_changes.fetch_add(1, Ordering::SeqCst);
        Some((result, true))
    }

    /// Deliver the latest state to callbacks.
    ///
    /// If another thread is already delivering, it picks up this change.
    /// The same applies when a callback changes the state reentrantly.
    fn notify(&self) {
        loop {
            let seen = {
                let mut delivered = match self.delivery.try_lock() {
                    Ok(guard) => guard,
                    Err(TryLockError::Poisoned(e)) => e.into_inner(),
                    Err(TryLockError::WouldBlock) => return,
                };
                loop {
                    let seen = self.state_changes.load(Ordering::SeqCst);
                    let state = self.state_tx.borrow().clone();
                    if delivered.as_ref() != Some(&state) {
                        tracing::debug!(status = %state.status, attempt = state.attempt, "Connection state changed");
                        self.state_listeners.emit(STATE_CHANGED, &state);
                        *delivered = Some(state);
                    }
                    if self.state_changes.load(Ordering::SeqCst) == seen {
                        break seen;
                    }
                }
            };
            // A change that raced with releasing the guard found it held.
            if self.state_changes.load(Ordering::SeqCst) == seen {
                return;
            }
        }
    }

    fn begin_attempt(&self, epoch: u64) -> bool {
        self.apply(Some(epoch), |control| {
            control.state.status = ConnectionStatus::Connecting;
        })
        .is_some()
    }

    /// Install the link, go Connected, and replay room membership.
    fn attach(&self, epoch: u64, sender: mpsc::UnboundedSender<String>) -> bool {
        let mut outcome = None;
        let replayed = self.rooms.replay_after(|| {
            outcome = self.apply_quiet(Some(epoch), |control| {
                self.outbound.attach(sender);
                control.state.status = ConnectionStatus::Connected;
                control.state.attempt = 0;
                control.state.last_connected_at = Some(Timestamp::now());
                control.state.last_error = None;
            });
            outcome.is_some()
        });

        match outcome {
            Some((_, changed)) => {
                tracing::info!(epoch, rooms_replayed = replayed, "Connected to event service");
                if changed {
                    self.notify();
                }
                true
            }
            None => false,
        }
    }

    /// Record a failed open or a lost link.
    ///
    /// Returns the backoff before the next attempt, `Some(None)` when the
    /// budget is spent, or `None` when the epoch is stale.
    fn link_failed(&self, epoch: u64, reason: String) -> Option<Option<Duration>> {
        let policy = self.settings.reconnect;
        self.apply(Some(epoch), |control| {
            self.outbound.detach();
            control.state.status = ConnectionStatus::Disconnected;
            control.state.last_error = Some(reason);
            if policy.allows(control.state.attempt) {
                let delay = policy.delay_for(control.state.attempt);
                control.state.attempt += 1;
                Some(delay)
            } else {
                None
            }
        })
    }

    fn give_up(&self, epoch: u64) {
        let applied = self.apply(Some(epoch), |control| {
            control.state.status = ConnectionStatus::Error;
            control.state.last_error = Some(ATTEMPTS_EXHAUSTED.to_string());
            control.supervisor = None;
        });
        if applied.is_some() {
            tracing::error!(
                max_attempts = self.settings.reconnect.max_attempts,
                "Reconnect attempts exhausted; waiting for an explicit connect"
            );
        }
    }

    /// Decode and route one text frame. Returns a reason when the server
    /// asked us to go away.
    fn handle_frame(&self, epoch: u64, text: &str) -> Option<String> {
        let event = match decode_frame(text) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!(frame_len = text.len(), "Ignoring unknown event");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Dropping malformed frame");
                return None;
            }
        };

        match &event {
            InboundEvent::SessionUpdate(update) => {
                self.session_updates().push(update.clone());
            }
            InboundEvent::Notification(notification) => {
                self.notification_history().push(notification.clone());
            }
            InboundEvent::Announcement(announcement) => {
                self.notification_history().push(Notification::from(announcement.clone()));
            }
            InboundEvent::ServerError(error) => {
                tracing::warn!(message = %error.message, "Event service reported an error");
                let message = error.message.clone();
                self.apply(Some(epoch), |control| control.state.last_error = Some(message));
            }
            InboundEvent::ConnectionAck(ack) => {
                tracing::debug!(user_id = ?ack.user_id, "Connection acknowledged");
            }
            _ => {}
        }

        let delivered = self.events.emit(event.name(), &event);
        tracing::trace!(event = event.name(), delivered, "Event dispatched");

        match event {
            InboundEvent::Disconnect(notice) => Some(format!("server disconnect: {}", notice.reason)),
            _ => None,
        }
    }
}

impl Drop for TransportConnection {
    fn drop(&mut self) {
        if let Some(handle) = self.control().supervisor.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TransportConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnection")
            .field("state", &self.state())
            .field("rooms", &self.rooms)
            .finish_non_exhaustive()
    }
}

async fn supervise(connection: Weak<TransportConnection>, epoch: u64, identity: Identity) {
    loop {
        let (transport, timeout) = {
            let Some(conn) = connection.upgrade() else { return };
            if !conn.begin_attempt(epoch) {
                return;
            }
            (Arc::clone(&conn.transport), conn.settings.connect_timeout)
        };

        let opened = match tokio::time::timeout(timeout, transport.open(&identity)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        let reason = match opened {
            Ok(TransportLink { outbound, inbound }) => {
                {
                    let Some(conn) = connection.upgrade() else { return };
                    if !conn.attach(epoch, outbound) {
                        return;
                    }
                }
                match pump(&connection, epoch, inbound).await {
                    LinkEnd::Closed(reason) => {
                        tracing::warn!(reason = %reason, "Connection lost");
                        reason
                    }
                    LinkEnd::Abandoned => return,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to open connection");
                err.to_string()
            }
        };

        let delay = {
            let Some(conn) = connection.upgrade() else { return };
            match conn.link_failed(epoch, reason) {
                None => return,
                Some(None) => {
                    conn.give_up(epoch);
                    return;
                }
                Some(Some(delay)) => delay,
            }
        };

        tracing::info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        tokio::time::sleep(delay).await;
    }
}

async fn pump(
    connection: &Weak<TransportConnection>,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportFrame>,
) -> LinkEnd {
    loop {
        let frame = inbound.recv().await;
        let Some(conn) = connection.upgrade() else {
            return LinkEnd::Abandoned;
        };
        if !conn.is_current(epoch) {
            return LinkEnd::Abandoned;
        }

        match frame {
            None => return LinkEnd::Closed("transport closed".to_string()),
            Some(TransportFrame::Closed { reason }) => return LinkEnd::Closed(reason),
            Some(TransportFrame::Text(text)) => {
                if let Some(reason) = conn.handle_frame(epoch, &text) {
                    return LinkEnd::Closed(reason);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryTransport, ServerHandle};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn identity() -> Identity {
        Identity::new("user-1", "0xabc").unwrap()
    }

    fn sid(s: &str) -> SessionId {
        SessionId::new(s).unwrap()
    }

    fn fast_settings() -> ConnectionSettings {
        ConnectionSettings {
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(40),
                max_attempts: 3,
            },
            connect_timeout: Duration::from_millis(200),
            notification_capacity: 3,
            session_update_capacity: 5,
        }
    }

    fn setup() -> (Arc<TransportConnection>, ServerHandle) {
        let transport = InMemoryTransport::new();
        let server = transport.server();
        (
            TransportConnection::new(Arc::new(transport), fast_settings()),
            server,
        )
    }

    async fn wait_for_status(conn: &TransportConnection, status: ConnectionStatus) {
        let mut rx = conn.watch_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.status == status))
            .await
            .expect("timed out waiting for status")
            .expect("state channel closed");
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn connect_reaches_connected_with_identity() {
        let (conn, server) = setup();

        assert!(conn.connect(identity()));
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        let state = conn.state();
        assert_eq!(state.attempt, 0);
        assert!(state.last_connected_at.is_some());
        assert_eq!(server.last_identity(), Some(identity()));
    }

    #[tokio::test]
    async fn connect_twice_for_same_identity_is_noop() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        assert!(!conn.connect(identity()));
        assert_eq!(server.open_count(), 1);
    }

    #[tokio::test]
    async fn send_is_false_until_connected() {
        let (conn, _server) = setup();
        assert!(!conn.request_session_info(&sid("s1")));

        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        assert!(conn.request_session_info(&sid("s1")));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_keeps_rooms() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        conn.join_room(&sid("s1"));

        conn.disconnect();
        conn.disconnect();

        assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
        assert_eq!(conn.rooms().ref_count(&sid("s1")), 1);
        eventually(|| !server.is_connected()).await;
    }

    #[tokio::test]
    async fn reconnect_replays_rooms_once() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        conn.join_room(&sid("a"));
        conn.join_room(&sid("b"));
        conn.join_room(&sid("b"));
        server.clear_received();

        server.close("network blip");
        eventually(|| server.open_count() == 2).await;
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        eventually(|| server.count("joinSession", "a") == 1).await;
        assert_eq!(server.count("joinSession", "b"), 1);
        assert_eq!(server.commands().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_attempts_end_in_error_until_connect() {
        let (conn, server) = setup();
        server.refuse_connections(true);

        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Error).await;

        let state = conn.state();
        assert_eq!(state.last_error.as_deref(), Some(ATTEMPTS_EXHAUSTED));
        // First open plus three retries.
        assert_eq!(server.open_count(), 4);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.open_count(), 4);

        server.refuse_connections(false);
        assert!(conn.reconnect());
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        assert_eq!(conn.state().attempt, 0);
    }

    #[tokio::test]
    async fn connect_timeout_counts_as_failed_attempt() {
        let (conn, server) = setup();
        server.stall_connections(true);

        conn.connect(identity());
        eventually(|| conn.state().attempt >= 1).await;

        let state = conn.state();
        assert!(state.last_error.unwrap_or_default().contains("timed out"));
        conn.disconnect();
    }

    #[tokio::test]
    async fn inbound_events_feed_listeners_and_history() {
        let (conn, server) = setup();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let _sub = conn.on("sessionUpdate", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        server.emit(
            "sessionUpdate",
            json!({"sessionId": "s1", "type": "session_updated", "data": {}}),
        );
        server.emit("announcement", json!({"title": "Hi", "message": "all"}));

        eventually(|| seen.load(Ordering::SeqCst) == 1).await;
        eventually(|| conn.notifications().len() == 1).await;
        assert!(conn.latest_session_update(&sid("s1")).is_some());
        assert!(conn.latest_session_update(&sid("other")).is_none());
    }

    #[tokio::test]
    async fn notification_history_is_bounded() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        for i in 0..5 {
            server.emit("notification", json!({"title": format!("n{}", i), "message": "m"}));
        }

        eventually(|| {
            conn.notifications()
                .first()
                .is_some_and(|n| n.title == "n4")
        })
        .await;
        let titles: Vec<String> = conn.notifications().into_iter().map(|n| n.title).collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);

        conn.remove_notification(0);
        assert_eq!(conn.notifications().len(), 2);
        conn.clear_notifications();
        assert!(conn.notifications().is_empty());
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped_and_stream_continues() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        server.send_raw("{garbage");
        server.emit("mystery", json!({}));
        server.emit("notification", json!({"title": "ok", "message": "m"}));

        eventually(|| conn.notifications().len() == 1).await;
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn server_error_records_last_error_only() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        server.emit("error", json!({"message": "rate limited"}));

        eventually(|| conn.state().last_error.as_deref() == Some("rate limited")).await;
        assert!(conn.is_connected());
    }

    #[tokio::test]
    async fn server_disconnect_event_triggers_reconnect() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        server.emit("disconnect", json!({"reason": "maintenance"}));

        eventually(|| server.open_count() == 2).await;
        wait_for_status(&conn, ConnectionStatus::Connected).await;
    }

    #[tokio::test]
    async fn state_callbacks_observe_transitions() {
        let (conn, _server) = setup();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let _sub = conn.on_state_change(move |state| {
            sink.lock().unwrap().push(state.status);
            Ok(())
        });

        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;
        conn.disconnect();

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn state_callback_may_disconnect_reentrantly() {
        let (conn, _server) = setup();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let weak = Arc::downgrade(&conn);
        let _sub = conn.on_state_change(move |state| {
            sink.lock().unwrap().push(state.status);
            if state.status == ConnectionStatus::Connected {
                if let Some(conn) = weak.upgrade() {
                    conn.disconnect();
                }
            }
            Ok(())
        });

        conn.connect(identity());
        eventually(|| statuses.lock().unwrap().last() == Some(&ConnectionStatus::Disconnected)).await;

        assert_eq!(conn.state().status, ConnectionStatus::Disconnected);
        assert_eq!(
            *statuses.lock().unwrap(),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ]
        );
    }

    #[tokio::test]
    async fn different_identity_replaces_link() {
        let (conn, server) = setup();
        conn.connect(identity());
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        let other = Identity::new("user-2", "0xdef").unwrap();
        assert!(conn.connect(other.clone()));
        eventually(|| server.open_count() == 2).await;
        wait_for_status(&conn, ConnectionStatus::Connected).await;

        assert_eq!(conn.identity(), Some(other.clone()));
        assert_eq!(server.last_identity(), Some(other));
    }

    #[test]
    fn connect_without_runtime_reports_error() {
        let (conn, _server) = setup();

        assert!(!conn.connect(identity()));
        assert_eq!(conn.state().status, ConnectionStatus::Error);
    }

    #[test]
    fn outbound_channel_without_link_refuses() {
        let channel = OutboundChannel::new();
        assert!(!channel.is_open());
        assert!(!channel.send(&OutboundCommand::join(&sid("s1"))));
    }
}
