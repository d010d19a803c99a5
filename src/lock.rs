//! Distributed zone lock.
//!
//! Mutual exclusion between concurrent reconciler invocations is built
//! on a conditional-write key-value store: acquire is create-if-absent,
//! release is delete-if-holder-matches. Every lock carries a lease so a
//! crashed holder can only block the zone until the lease expires; an
//! expired entry counts as absent on the next acquire.
//!
//! Contention is an outcome, not an error: `acquire` answers `Denied`
//! when another unexpired holder exists, and `release` answers `NotHeld`
//! when the lease already lapsed and someone else took over. The caller
//! treats `NotHeld` as success since there is nothing left to undo.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use sha2::{Digest, Sha256};
use tokio::time::sleep;

use crate::error::{LockError, ReconcileError};
use crate::retry::RetryPolicy;

/// Result of an acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Granted,
    /// Another valid, unexpired holder exists. Expected under contention.
    Denied,
}

/// Result of a release attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The caller's entry was removed.
    Released,
    /// The caller no longer held the lock (lease expired, or a different
    /// holder has since taken it).
    NotHeld,
}

/// Conditional-write lock store shared by all reconciler invocations.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create the lock entry for `key` if no unexpired one exists.
    async fn acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<AcquireOutcome, LockError>;

    /// Delete the lock entry for `key` if it is held under `token`.
    async fn release(&self, key: &str, token: &str) -> Result<ReleaseOutcome, LockError>;
}

#[derive(Debug)]
struct LockEntry {
    token: String,
    expires_at: Instant,
}

/// In-memory lock store with the same conditional-put/delete semantics
/// a production key-value backend provides. Backs tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl MemoryLockStore {
    /// Create an empty lock store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> Result<AcquireOutcome, LockError> {
        let mut entries = self.entries.lock().expect("lock store mutex poisoned");
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(AcquireOutcome::Denied);
            }
            debug!("lock {} lease expired, treating as absent", key);
        }
        entries.insert(
            key.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: now + lease,
            },
        );
        Ok(AcquireOutcome::Granted)
    }

    async fn release(&self, key: &str, token: &str) -> Result<ReleaseOutcome, LockError> {
        let mut entries = self.entries.lock().expect("lock store mutex poisoned");
        match entries.get(key) {
            Some(entry) if entry.token == token => {
                entries.remove(key);
                Ok(ReleaseOutcome::Released)
            }
            _ => Ok(ReleaseOutcome::NotHeld),
        }
    }
}

/// Derive a holder token unique to one acquire attempt of one event.
///
/// A fresh token per attempt keeps redelivered events from confusing
/// themselves with an earlier invocation that died while holding the
/// lock.
pub fn holder_token(member_id: &str, event_token: &str, attempt: u32) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(member_id.as_bytes());
    hasher.update(event_token.as_bytes());
    hasher.update(attempt.to_be_bytes());
    hasher.update(nanos.to_be_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Acquire the zone lock, retrying with bounded exponential backoff
/// while it is held elsewhere. Returns the granted holder token.
///
/// The total wait is bounded by `wait_budget`; exhausting it fails the
/// event with [`ReconcileError::LockTimeout`] so the orchestrator can
/// redeliver. Transient backend errors are retried within the same
/// budget.
pub async fn acquire_with_backoff(
    store: &dyn LockStore,
    key: &str,
    member_id: &str,
    event_token: &str,
    lease: Duration,
    wait_budget: Duration,
    backoff: &RetryPolicy,
) -> Result<String, ReconcileError> {
    let started = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        let token = holder_token(member_id, event_token, attempt);
        match store.acquire(key, &token, lease).await {
            Ok(AcquireOutcome::Granted) => {
                debug!("lock {} granted to {} (attempt {})", key, token, attempt + 1);
                return Ok(token);
            }
            Ok(AcquireOutcome::Denied) => {
                debug!("lock {} held elsewhere (attempt {})", key, attempt + 1);
            }
            Err(err) => {
                warn!("lock backend error on {}: {}", key, err);
            }
        }
        let delay = backoff.delay(attempt);
        if started.elapsed() + delay >= wait_budget {
            return Err(ReconcileError::LockTimeout {
                waited: started.elapsed(),
            });
        }
        sleep(delay).await;
        attempt += 1;
    }
}
