// API key pool with per-key health tracking
//
// Every remote call borrows a key from the pool and reports the outcome.
// Keys with repeated failures are routed around until they cool down.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Consecutive failures after which a key is considered unhealthy
const UNHEALTHY_AFTER: u32 = 3;
/// Consecutive successes that clear a key's failure history
const RECOVERED_AFTER: u32 = 5;
/// A key with a failure this recent is degraded
const DEGRADED_WINDOW: Duration = Duration::from_secs(60);
/// An unhealthy key is offered again after this long
const RECOVERY_PROBE_AFTER: Duration = Duration::from_secs(300);

/// Health status of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone)]
struct TrackedKey {
    secret: String,
    index: usize,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    total_requests: u64,
    total_failures: u64,
}

impl TrackedKey {
    fn new(secret: String, index: usize) -> Self {
        Self {
            secret,
            index,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure: None,
            total_requests: 0,
            total_failures: 0,
        }
    }

    fn health(&self) -> KeyHealth {
        if self.consecutive_failures >= UNHEALTHY_AFTER {
            return KeyHealth::Unhealthy;
        }
        match self.last_failure {
            Some(at) if self.consecutive_failures > 0 && at.elapsed() < DEGRADED_WINDOW => {
                KeyHealth::Degraded
            }
            _ => KeyHealth::Healthy,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_requests as f64
        }
    }

    fn probe_allowed(&self) -> bool {
        self.last_failure
            .map(|at| at.elapsed() > RECOVERY_PROBE_AFTER)
            .unwrap_or(true)
    }
}

/// Per-key statistics for the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct KeyStats {
    pub index: usize,
    pub health: KeyHealth,
    pub total_requests: u64,
    pub total_failures: u64,
    pub failure_rate: f64,
}

/// Round-robin pool over the healthiest available keys
pub struct ApiKeyPool {
    keys: RwLock<Vec<TrackedKey>>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        let tracked = keys
            .into_iter()
            .enumerate()
            .map(|(i, secret)| TrackedKey::new(secret, i))
            .collect();

        Self {
            keys: RwLock::new(tracked),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pick a key: healthy first, then degraded, then unhealthy keys due a probe.
    ///
    /// Returns `(index, secret)` or `None` when every key is cooling down.
    pub async fn get_healthy_key(&self) -> Option<(usize, String)> {
        let keys = self.keys.read().await;

        let tiers: [(&str, fn(&TrackedKey) -> bool); 3] = [
            ("healthy", |k: &TrackedKey| k.health() == KeyHealth::Healthy),
            ("degraded", |k: &TrackedKey| k.health() == KeyHealth::Degraded),
            ("recovering", |k: &TrackedKey| {
                k.health() == KeyHealth::Unhealthy && k.probe_allowed()
            }),
        ];

        for (tier, accept) in tiers.iter() {
            let candidates: Vec<&TrackedKey> = keys.iter().filter(|k| accept(k)).collect();
            if candidates.is_empty() {
                continue;
            }
            let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
            let key = candidates[slot];
            if *tier == "healthy" {
                debug!("Using API key {} ({} healthy)", key.index, candidates.len());
            } else {
                warn!("No healthy keys, using {} API key {}", tier, key.index);
            }
            return Some((key.index, key.secret.clone()));
        }

        warn!("No API keys available (all unhealthy)");
        None
    }

    pub async fn record_success(&self, key_index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(key) = keys.get_mut(key_index) {
            key.consecutive_successes += 1;
            key.consecutive_failures = 0;
            key.total_requests += 1;

            if key.consecutive_successes >= RECOVERED_AFTER && key.last_failure.take().is_some() {
                info!(
                    "API key {} recovered ({} consecutive successes)",
                    key.index, key.consecutive_successes
                );
            }
        }
    }

    pub async fn record_failure(&self, key_index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(key) = keys.get_mut(key_index) {
            key.consecutive_failures += 1;
            key.consecutive_successes = 0;
            key.last_failure = Some(Instant::now());
            key.total_requests += 1;
            key.total_failures += 1;

            if key.consecutive_failures == UNHEALTHY_AFTER {
                warn!(
                    "API key {} marked unhealthy ({} consecutive failures, {:.1}% overall failure rate)",
                    key.index,
                    key.consecutive_failures,
                    key.failure_rate() * 100.0
                );
            }
        }
    }

    pub async fn stats(&self) -> Vec<KeyStats> {
        let keys = self.keys.read().await;
        keys.iter()
            .map(|k| KeyStats {
                index: k.index,
                health: k.health(),
                total_requests: k.total_requests,
                total_failures: k.total_failures,
                failure_rate: k.failure_rate(),
            })
            .collect()
    }

    pub async fn healthy_count(&self) -> usize {
        let keys = self.keys.read().await;
        keys.iter().filter(|k| k.health() == KeyHealth::Healthy).count()
    }

    pub async fn total_keys(&self) -> usize {
        self.keys.read().await.len()
    }
}
