//! Sliding-window rate limiter for outbound API calls.
//!
//! Each named service carries one or more [`WindowRule`]s: minimum spacing
//! between consecutive calls, and counting ceilings over trailing windows
//! (per minute/hour/day). Admission history is a pruned list of epoch
//! timestamps, persisted through a [`WindowStore`] so quotas survive
//! process restarts.
//!
//! Invariants:
//! - After any admission check a service's history holds only timestamps
//!   inside its longest window, and no ceiling is exceeded.
//! - Check-then-append happens under one async lock, so two concurrent
//!   admissions can never both take the final slot of a ceiling.
//! - Persistence is best-effort: an unreadable store behaves as empty
//!   history (callers are never blocked by a corrupted store) and a failed
//!   save is logged and ignored for the current process.

use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub mod store;

pub use store::{DocumentWindowStore, MemoryWindowStore, WindowStore};

/// One quota rule for a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowRule {
    /// At least `spacing` between consecutive admitted calls.
    Spacing { spacing: Duration },
    /// At most `limit` admitted calls within the trailing `window`.
    Ceiling { name: &'static str, limit: usize, window: Duration },
}

/// A service and the rules that govern it.
#[derive(Debug, Clone)]
pub struct ServiceLimits {
    pub service: &'static str,
    pub rules: Vec<WindowRule>,
}

impl ServiceLimits {
    pub fn new(service: &'static str, rules: Vec<WindowRule>) -> Self {
        Self { service, rules }
    }

    fn longest_window(&self) -> Duration {
        self.rules
            .iter()
            .map(|rule| match rule {
                WindowRule::Spacing { spacing } => *spacing,
                WindowRule::Ceiling { window, .. } => *window,
            })
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

/// The outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Admitted; `remaining` is the tightest ceiling headroom after this
    /// call.
    Allowed { remaining: usize },
    /// Denied; `wait` is how long until the violated rule would admit.
    Denied { wait: Duration, reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    pub fn wait(&self) -> Option<Duration> {
        match self {
            Decision::Denied { wait, .. } => Some(*wait),
            Decision::Allowed { .. } => None,
        }
    }
}

struct ServiceState {
    loaded: bool,
    history: Vec<u64>,
}

/// Sliding-window limiter over a persistent timestamp store.
pub struct RateLimiter {
    limits: HashMap<&'static str, ServiceLimits>,
    store: Arc<dyn WindowStore>,
    clock: Arc<dyn Clock>,
    // One lock for all services keeps check-then-append atomic across the
    // persistence await. Contention is negligible at client call rates.
    state: Mutex<HashMap<&'static str, ServiceState>>,
}

impl RateLimiter {
    pub fn new(
        limits: Vec<ServiceLimits>,
        store: Arc<dyn WindowStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limits: limits.into_iter().map(|l| (l.service, l)).collect(),
            store,
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Check every rule for `service`; on admission, record and persist the
    /// call. A service with no configured limits is always admitted.
    pub async fn check_admission(&self, service: &'static str) -> Decision {
        let Some(limits) = self.limits.get(service) else {
            return Decision::Allowed { remaining: usize::MAX };
        };

        let mut state = self.state.lock().await;
        let entry = Self::load_if_needed(&mut state, service, self.store.as_ref()).await;
        let now = self.clock.now_millis();

        prune(&mut entry.history, now, limits.longest_window());

        // Spacing rules first, then ceilings from shortest window to
        // longest; the first violated rule names the denial.
        for rule in ordered(&limits.rules) {
            match rule {
                WindowRule::Spacing { spacing } => {
                    if let Some(&last) = entry.history.last() {
                        let elapsed = now.saturating_sub(last);
                        let spacing_ms = spacing.as_millis() as u64;
                        if elapsed < spacing_ms {
                            return Decision::Denied {
                                wait: Duration::from_millis(spacing_ms - elapsed),
                                reason: format!("{service}: minimum request spacing"),
                            };
                        }
                    }
                }
                WindowRule::Ceiling { name, limit, window } => {
                    let floor = window_floor(now, *window);
                    let in_window: Vec<u64> =
                        entry.history.iter().copied().filter(|&ts| ts >= floor).collect();
                    if in_window.len() >= *limit {
                        let oldest = in_window.first().copied().unwrap_or(now);
                        let reopens = oldest + window.as_millis() as u64;
                        return Decision::Denied {
                            wait: Duration::from_millis(reopens.saturating_sub(now)),
                            reason: format!("{service}: {name} limit of {limit} reached"),
                        };
                    }
                }
            }
        }

        entry.history.push(now);
        if let Err(e) = self.store.save(service, &entry.history).await {
            tracing::warn!(service, error = %e, "failed to persist rate-limit history");
        }

        let remaining = limits
            .rules
            .iter()
            .filter_map(|rule| match rule {
                WindowRule::Ceiling { limit, window, .. } => {
                    let floor = window_floor(now, *window);
                    let count = entry.history.iter().filter(|&&ts| ts >= floor).count();
                    Some(limit.saturating_sub(count))
                }
                WindowRule::Spacing { .. } => None,
            })
            .min()
            .unwrap_or(usize::MAX);

        Decision::Allowed { remaining }
    }

    /// Headroom left in one named ceiling window. Non-mutating.
    pub async fn remaining(&self, service: &'static str, window_name: &str) -> Option<usize> {
        let limits = self.limits.get(service)?;
        let (limit, window) = limits.rules.iter().find_map(|rule| match rule {
            WindowRule::Ceiling { name, limit, window } if *name == window_name => {
                Some((*limit, *window))
            }
            _ => None,
        })?;

        let mut state = self.state.lock().await;
        let entry = Self::load_if_needed(&mut state, service, self.store.as_ref()).await;
        let now = self.clock.now_millis();
        let floor = window_floor(now, window);
        let count = entry.history.iter().filter(|&&ts| ts >= floor).count();
        Some(limit.saturating_sub(count))
    }

    /// Drop all history for `service`, in memory and in the store.
    pub async fn reset(&self, service: &'static str) {
        let mut state = self.state.lock().await;
        state.insert(service, ServiceState { loaded: true, history: Vec::new() });
        if let Err(e) = self.store.clear(service).await {
            tracing::warn!(service, error = %e, "failed to clear rate-limit history");
        }
    }

    async fn load_if_needed<'a>(
        state: &'a mut HashMap<&'static str, ServiceState>,
        service: &'static str,
        store: &dyn WindowStore,
    ) -> &'a mut ServiceState {
        let entry = state
            .entry(service)
            .or_insert_with(|| ServiceState { loaded: false, history: Vec::new() });
        if !entry.loaded {
            entry.history = match store.load(service).await {
                Ok(Some(history)) => history,
                Ok(None) => Vec::new(),
                Err(e) => {
                    // Fail open: a corrupted store must not block callers.
                    tracing::warn!(service, error = %e, "rate-limit history unreadable; starting empty");
                    Vec::new()
                }
            };
            entry.loaded = true;
        }
        entry
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").field("services", &self.limits.len()).finish()
    }
}

fn window_floor(now: u64, window: Duration) -> u64 {
    now.saturating_sub(window.as_millis() as u64)
}

fn prune(history: &mut Vec<u64>, now: u64, longest: Duration) {
    let floor = window_floor(now, longest);
    history.retain(|&ts| ts >= floor);
}

fn ordered(rules: &[WindowRule]) -> Vec<&WindowRule> {
    let mut out: Vec<&WindowRule> = rules.iter().collect();
    out.sort_by_key(|rule| match rule {
        WindowRule::Spacing { .. } => (0, Duration::ZERO),
        WindowRule::Ceiling { window, .. } => (1, *window),
    });
    out
}
