//! Last known wallet balance, refreshed on demand and on reward activity.
//!
//! Readings come from a `BalanceSource`. The monitor only decides when to
//! fetch and how far a reading can be trusted:
//!
//! - fetches are at least `min_fetch_interval` apart, one at a time
//! - a failed fetch keeps the previous reading and marks it stale
//! - losing the connection marks the reading stale
//! - readings older than `refresh_interval` are stale, older than
//!   `cache_expiry` are discarded

use serde::Serialize;
use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::adapters::events::Subscription;
use crate::application::connection::TransportConnection;
use crate::domain::foundation::{ConsumerId, DomainError, Timestamp};
use crate::domain::realtime::events::names;
use crate::domain::realtime::{BalanceSnapshot, ConnectionState, ConnectionStatus, StaleCache};
use crate::ports::BalanceSource;

use super::ConsumerAdapter;

/// Timing for a balance monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSettings {
    pub refresh_interval: Duration,
    pub min_fetch_interval: Duration,
    pub cache_expiry: Duration,
}

impl Default for BalanceSettings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            min_fetch_interval: Duration::from_secs(5),
            cache_expiry: Duration::from_secs(300),
        }
    }
}

/// Result of one `refresh` call.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated(BalanceSnapshot),
    /// Too soon after the previous fetch, or one is still running.
    Throttled,
    Failed(DomainError),
}

impl RefreshOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

/// Read-only snapshot handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub balance: Option<BalanceSnapshot>,
    pub is_stale: bool,
    pub last_updated: Option<Timestamp>,
    pub error: Option<String>,
    pub is_loading: bool,
}

#[derive(Default)]
struct BalanceState {
    cache: Option<StaleCache<BalanceSnapshot>>,
    last_error: Option<String>,
    last_fetch: Option<Instant>,
    in_flight: bool,
}

struct MonitorInner {
    id: ConsumerId,
    wallet_address: String,
    source: Arc<dyn BalanceSource>,
    settings: BalanceSettings,
    state: Mutex<BalanceState>,
    subscriptions: Mutex<Vec<Subscription>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

/// Clears the in-flight flag even when the fetch future is dropped.
struct InFlight<'a>(&'a MonitorInner);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.state().in_flight = false;
    }
}

impl MonitorInner {
    fn state(&self) -> MutexGuard<'_, BalanceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn refresh(&self) -> RefreshOutcome {
        {
            let mut state = self.state();
            if state.in_flight {
                return RefreshOutcome::Throttled;
            }
            if let Some(last) = state.last_fetch {
                if last.elapsed() < self.settings.min_fetch_interval {
                    tracing::trace!(wallet_address = %self.wallet_address, "Balance refresh throttled");
                    return RefreshOutcome::Throttled;
                }
            }
            state.in_flight = true;
            state.last_fetch = Some(Instant::now());
        }

        let _in_flight = InFlight(self);
        let result = self.source.fetch(&self.wallet_address).await;

        let mut state = self.state();
        match result {
            Ok(snapshot) => {
                let now = Timestamp::now();
                match state.cache.as_mut() {
                    Some(cache) => cache.refresh(snapshot, now),
                    None => state.cache = Some(StaleCache::fetched_at(snapshot, now)),
                }
                state.last_error = None;
                tracing::debug!(wallet_address = %self.wallet_address, "Balance refreshed");
                RefreshOutcome::Updated(snapshot)
            }
            Err(error) => {
                if let Some(cache) = state.cache.as_mut() {
                    cache.mark_stale();
                }
                state.last_error = Some(error.message.clone());
                tracing::warn!(
                    wallet_address = %self.wallet_address,
                    error = %error,
                    "Balance fetch failed, keeping cached value"
                );
                RefreshOutcome::Failed(error)
            }
        }
    }

    fn spawn_refresh(self: &Arc<Self>) -> bool {
        if self.torn_down.load(Ordering::SeqCst) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::debug!(consumer_id = %self.id, "No runtime for background balance refresh");
            return false;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            if let Some(inner) = weak.upgrade() {
                inner.refresh().await;
            }
        });

        let mut tasks = self.tasks();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        true
    }

    fn on_connection_state(self: &Arc<Self>, connection: &ConnectionState) {
        if connection.status == ConnectionStatus::Connected {
            self.spawn_refresh();
            return;
        }
        if let Some(cache) = self.state().cache.as_mut() {
            cache.mark_stale();
        }
    }

    fn tick(&self, now: &Timestamp) {
        let mut state = self.state();
        let expired = state
            .cache
            .as_ref()
            .is_some_and(|cache| cache.is_expired(self.settings.cache_expiry, now));

        if expired {
            state.cache = None;
            tracing::debug!(wallet_address = %self.wallet_address, "Cached balance expired");
        } else if let Some(cache) = state.cache.as_mut() {
            cache.refresh_staleness(self.settings.refresh_interval, now);
        }
    }

    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let subscriptions = mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()));
        drop(subscriptions);
        for task in self.tasks().drain(..) {
            task.abort();
        }
        tracing::debug!(consumer_id = %self.id, "Balance monitor torn down");
    }
}

/// Balance view for one wallet.
pub struct BalanceMonitor {
    inner: Arc<MonitorInner>,
}

impl BalanceMonitor {
    pub fn mount(
        connection: &TransportConnection,
        source: Arc<dyn BalanceSource>,
        wallet_address: impl Into<String>,
        settings: BalanceSettings,
    ) -> Self {
        let inner = Arc::new(MonitorInner {
            id: ConsumerId::new(),
            wallet_address: wallet_address.into(),
            source,
            settings,
            state: Mutex::new(BalanceState::default()),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::with_capacity(3);
        for event_name in [names::REWARD_UPDATE, names::TRANSACTION_UPDATE] {
            let weak = Arc::downgrade(&inner);
            subscriptions.push(connection.on(event_name, move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.spawn_refresh();
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
        *inner.subscriptions.lock().unwrap_or_else(|e| e.into_inner()) = subscriptions;

        tracing::debug!(consumer_id = %inner.id, wallet_address = %inner.wallet_address, "Balance monitor mounted");
        Self { inner }
    }

    pub fn wallet_address(&self) -> &str {
        &self.inner.wallet_address
    }

    /// Fetch now unless throttled.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.inner.refresh().await
    }

    /// Start a background refresh. `false` without a runtime or after teardown.
    pub fn refresh_in_background(&self) -> bool {
        self.inner.spawn_refresh()
    }

    /// Apply age-based staleness and expiry as of `now`.
    pub fn tick(&self, now: &Timestamp) {
        self.inner.tick(now);
    }

    /// Refresh immediately and then every `refresh_interval` until teardown.
    pub fn spawn_auto_refresh(&self) -> bool {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            return false;
        };

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.settings.refresh_interval;
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.tick(&Timestamp::now());
                inner.refresh().await;
            }
        });
        self.inner.tasks().push(task);
        true
    }

    pub fn balance(&self) -> Option<BalanceSnapshot> {
        self.inner.state().cache.as_ref().map(|c| *c.value())
    }

    pub fn is_stale(&self) -> bool {
        self.inner.state().cache.as_ref().is_some_and(|c| c.is_stale())
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state().last_error.clone()
    }

    pub fn view(&self) -> BalanceView {
        let state = self.inner.state();
        BalanceView {
            balance: state.cache.as_ref().map(|c| *c.value()),
            is_stale: state.cache.as_ref().is_some_and(|c| c.is_stale()),
            last_updated: state.cache.as_ref().map(|c| c.fetched_time()),
            error: state.last_error.clone(),
            is_loading: state.in_flight,
        }
    }
}

impl ConsumerAdapter for BalanceMonitor {
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

impl Drop for BalanceMonitor {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}
