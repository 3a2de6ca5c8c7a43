//! Request deduplication store.
//!
//! Gives at-most-once effect per idempotency key:
//! - the first request for a key becomes the leader and runs the handler
//! - concurrent duplicates wait on the leader's outcome instead of running
//! - successful outcomes are replayed verbatim until the TTL lapses
//!
//! Entries live in process memory only; separate instances do not share them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default replay window (120 s).
pub const DEFAULT_TTL: Duration = Duration::from_millis(120_000);

/// Default interval of the background sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

pub type Fingerprint = [u8; 32];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyError {
    #[error("The original request for this idempotency key was aborted")]
    Aborted,

    #[error("Idempotency key was reused with a different payload")]
    PayloadMismatch,
}

/// SHA-256 over method, path, calling principal and body.
///
/// `principal` is empty for routes that do not resolve a caller.
pub fn fingerprint(method: &str, path: &str, principal: &str, body: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(path.as_bytes());
    hasher.update(b"\n");
    hasher.update(principal.as_bytes());
    hasher.update(b"\n");
    hasher.update(body);
    hasher.finalize().into()
}

// ═══════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl CachedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of a leader request, shared with waiters and later replays.
#[derive(Debug)]
pub struct IdempotencyRecord {
    pub key: String,
    pub fingerprint: Fingerprint,
    pub response: CachedResponse,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl IdempotencyRecord {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    /// Check that a follow-up request carries the same payload as the leader.
    pub fn verify(&self, fingerprint: &Fingerprint) -> Result<(), IdempotencyError> {
        if &self.fingerprint == fingerprint {
            Ok(())
        } else {
            Err(IdempotencyError::PayloadMismatch)
        }
    }
}

type Outcome = Option<Arc<IdempotencyRecord>>;

enum Entry {
    InFlight {
        token: u64,
        outcome: watch::Receiver<Outcome>,
    },
    Done(Arc<IdempotencyRecord>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub in_flight: usize,
    pub completed: usize,
}

// ═══════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════

/// Result of looking up a key.
pub enum Lookup {
    /// First request for the key: run the handler, then complete the guard.
    Execute(InflightGuard),
    /// A cached successful outcome.
    Replay(Arc<IdempotencyRecord>),
    /// Another request with the same key is running.
    Wait(Waiter),
}

#[derive(Clone)]
pub struct IdempotencyStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    next_token: AtomicU64,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl IdempotencyStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(HashMap::new()),
                ttl,
                next_token: AtomicU64::new(1),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Look up a key, registering it as in flight if it is unknown.
    ///
    /// Registration happens synchronously under the lock, so two requests
    /// racing on the same key always resolve to one leader.
    pub fn check(&self, key: &str) -> Lookup {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Lookup {
        let mut entries = self.entries();

        match entries.get(key) {
            Some(Entry::Done(record)) if !record.is_expired(now) => {
                return Lookup::Replay(Arc::clone(record));
            }
            Some(Entry::InFlight { outcome, .. }) => {
                return Lookup::Wait(Waiter {
                    outcome: outcome.clone(),
                });
            }
            // Expired or unknown: start fresh.
            _ => {}
        }

        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = watch::channel(None);
        entries.insert(key.to_string(), Entry::InFlight { token, outcome: rx });

        Lookup::Execute(InflightGuard {
            store: self.clone(),
            key: key.to_string(),
            token,
            sender: Some(tx),
        })
    }

    /// Drop completed entries whose TTL has lapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| match entry {
            Entry::Done(record) => !record.is_expired(now),
            Entry::InFlight { .. } => true,
        });
        before - entries.len()
    }

    /// Forget every key. Leaders still running keep serving their own waiters.
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn stats(&self) -> StoreStats {
        self.entries()
            .values()
            .fold(StoreStats::default(), |mut stats, entry| {
                match entry {
                    Entry::InFlight { .. } => stats.in_flight += 1,
                    Entry::Done(_) => stats.completed += 1,
                }
                stats
            })
    }

    /// Run `sweep` every `every` until the returned task is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    tracing::debug!(removed, "Idempotency sweep");
                }
            }
        })
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.inner
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove `key` only if it still belongs to the leader holding `token`.
    fn release(&self, key: &str, token: u64, keep: Option<Arc<IdempotencyRecord>>) {
        let mut entries = self.entries();
        let owned = matches!(entries.get(key), Some(Entry::InFlight { token: t, .. }) if *t == token);
        if !owned {
            return;
        }
        match keep {
            Some(record) => {
                entries.insert(key.to_string(), Entry::Done(record));
            }
            None => {
                entries.remove(key);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Leader guard / waiter
// ═══════════════════════════════════════════════════════════

/// Held by the request that owns a key. Dropping it without calling
/// [`InflightGuard::complete`] releases every waiter with an abort.
pub struct InflightGuard {
    store: IdempotencyStore,
    key: String,
    token: u64,
    sender: Option<watch::Sender<Outcome>>,
}

impl InflightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the outcome to waiters. Only 2xx responses are kept for replay.
    pub fn complete(mut self, fingerprint: Fingerprint, response: CachedResponse) -> Arc<IdempotencyRecord> {
        let record = Arc::new(IdempotencyRecord {
            key: self.key.clone(),
            fingerprint,
            created_at: Instant::now(),
            ttl: self.store.ttl(),
            response,
        });

        let keep = record.response.is_success().then(|| Arc::clone(&record));
        self.store.release(&self.key, self.token, keep);

        if let Some(sender) = self.sender.take() {
            // No receivers left is fine.
            let _ = sender.send(Some(Arc::clone(&record)));
        }
        record
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::warn!(key = %self.key, "Idempotent request aborted before completion");
            self.store.release(&self.key, self.token, None);
            // Dropping the sender wakes waiters with an error.
            self.sender = None;
        }
    }
}

pub struct Waiter {
    outcome: watch::Receiver<Outcome>,
}

impl Waiter {
    /// Wait for the leader's outcome.
    pub async fn wait(mut self) -> Result<Arc<IdempotencyRecord>, IdempotencyError> {
        let published = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .map_err(|_| IdempotencyError::Aborted)?;
        published.clone().ok_or(IdempotencyError::Aborted)
    }
}
