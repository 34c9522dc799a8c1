//! Per-IP fixed-window rate limiting for write requests.
//!
//! The limiter is split into three seams so tests can drive it without
//! sleeping: a [`Clock`] supplying `now`, a [`RateStore`] holding window
//! state per client, and the [`WindowPolicy`] describing the limit.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::observability::metrics;

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock mutex poisoned");
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("manual clock mutex poisoned")
    }
}

/// How many writes a client may make per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// Counter state for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub started: Instant,
}

impl WindowState {
    fn is_expired(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.started) >= window
    }
}

/// Outcome of asking for one write slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time left until the client's window resets.
    pub reset_after: Duration,
}

/// Storage for per-client windows.
///
/// `try_acquire` must be atomic per key: concurrent calls for the same
/// client never admit more than `policy.max_requests` in one window.
pub trait RateStore: Send + Sync + 'static {
    fn try_acquire(&self, key: IpAddr, policy: &WindowPolicy, now: Instant) -> Admission;

    /// Drop windows that have expired. Returns how many were removed.
    fn purge_expired(&self, window: Duration, now: Instant) -> usize;

    /// Number of clients currently tracked.
    fn tracked_clients(&self) -> usize;
}

/// In-process store, one `DashMap` shard lock per key.
#[derive(Debug, Default)]
pub struct MemoryRateStore {
    windows: DashMap<IpAddr, WindowState>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, key: &IpAddr) -> Option<WindowState> {
        self.windows.get(key).map(|w| *w)
    }
}

impl RateStore for MemoryRateStore {
    fn try_acquire(&self, key: IpAddr, policy: &WindowPolicy, now: Instant) -> Admission {
        let mut entry = self.windows.entry(key).or_insert(WindowState {
            count: 0,
            started: now,
        });

        // Window expired? Start a fresh one.
        if entry.is_expired(policy.window, now) {
            entry.count = 0;
            entry.started = now;
        }

        let allowed = entry.count < policy.max_requests;
        if allowed {
            entry.count += 1;
        }

        let elapsed = now.saturating_duration_since(entry.started);
        Admission {
            allowed,
            limit: policy.max_requests,
            remaining: policy.max_requests.saturating_sub(entry.count),
            reset_after: policy.window.saturating_sub(elapsed),
        }
    }

    fn purge_expired(&self, window: Duration, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, state| !state.is_expired(window, now));
        before - self.windows.len()
    }

    fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}

/// Write limiter combining a store, a clock and a policy.
#[derive(Clone)]
pub struct WriteLimiter {
    store: Arc<dyn RateStore>,
    clock: Arc<dyn Clock>,
    policy: WindowPolicy,
}

impl WriteLimiter {
    pub fn new(store: Arc<dyn RateStore>, clock: Arc<dyn Clock>, policy: WindowPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    /// Limiter over a fresh in-memory store and the system clock.
    pub fn in_memory(policy: WindowPolicy) -> Self {
        Self::new(Arc::new(MemoryRateStore::new()), Arc::new(SystemClock), policy)
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Try to take one write slot for `client`.
    pub fn check(&self, client: IpAddr) -> Admission {
        self.store.try_acquire(client, &self.policy, self.clock.now())
    }

    /// Remove expired windows now.
    pub fn sweep(&self) -> usize {
        let removed = self.store.purge_expired(self.policy.window, self.clock.now());
        metrics::record_rate_windows(self.store.tracked_clients());
        removed
    }

    /// Periodically sweep expired windows until shutdown.
    pub fn spawn_sweeper(&self, mut shutdown: broadcast::Receiver<()>) {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.policy.window);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, "Purged expired rate windows");
                        }
                    }
                }
            }
        });
    }
}
