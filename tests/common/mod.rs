//! Shared test infrastructure for reconciler integration tests.
#![allow(dead_code)]

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fleetdns::config::LockConfig;
use fleetdns::error::{AckError, ZoneError};
use fleetdns::{
    Config, LifecycleAcknowledger, LockStore, Member, MemberDirectory, MemoryDirectory,
    MemoryLockStore, MemoryZone, Reconciler, RetryPolicy, ZoneClient,
};

pub const ZONE_ID: &str = "Z-TEST";
pub const ZONE_NAME: &str = "ci-cd.example.com";

/// Config tuned for fast tests: millisecond backoffs, short budgets.
pub fn test_config() -> Config {
    Config {
        zone_id: ZONE_ID.into(),
        zone_name: ZONE_NAME.into(),
        lock: LockConfig {
            lease_secs: 5,
            wait_budget_secs: 1,
            backoff: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 2,
                max_delay_ms: 10,
            },
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        event_budget_secs: 30,
        ..Default::default()
    }
}

pub fn member(id: &str, private_ip: Option<&str>, public_ip: Option<&str>) -> Member {
    Member {
        id: id.to_string(),
        private_ip: private_ip.map(|s| s.parse().unwrap()),
        public_ip: public_ip.map(|s| s.parse().unwrap()),
        ..Default::default()
    }
}

// --- RecordingAcknowledger ---

/// One handshake call as seen by the orchestrator side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckCall {
    Complete(String),
    Abandon(String, String),
}

/// Records handshake calls for assertions.
#[derive(Debug, Default)]
pub struct RecordingAcknowledger {
    calls: Mutex<Vec<AckCall>>,
}

impl RecordingAcknowledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<AckCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn completed_tokens(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AckCall::Complete(token) => Some(token),
                _ => None,
            })
            .collect()
    }

    pub fn abandoned(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                AckCall::Abandon(token, reason) => Some((token, reason)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl LifecycleAcknowledger for RecordingAcknowledger {
    async fn complete(&self, token: &str) -> Result<(), AckError> {
        self.calls
            .lock()
            .unwrap()
            .push(AckCall::Complete(token.to_string()));
        Ok(())
    }

    async fn abandon(&self, token: &str, reason: &str) -> Result<(), AckError> {
        self.calls
            .lock()
            .unwrap()
            .push(AckCall::Abandon(token.to_string(), reason.to_string()));
        Ok(())
    }
}

/// Acknowledger whose calls always fail at the transport level.
#[derive(Debug, Default)]
pub struct FailingAcknowledger;

#[async_trait]
impl LifecycleAcknowledger for FailingAcknowledger {
    async fn complete(&self, _token: &str) -> Result<(), AckError> {
        Err(AckError::Backend("orchestrator unreachable".into()))
    }

    async fn abandon(&self, _token: &str, _reason: &str) -> Result<(), AckError> {
        Err(AckError::Backend("orchestrator unreachable".into()))
    }
}

// --- Zone test doubles ---

/// Zone that fails its first `failures` mutation calls, then behaves
/// like [`MemoryZone`]. Exercises the bounded retry path.
#[derive(Debug, Default)]
pub struct FlakyZone {
    inner: MemoryZone,
    remaining_failures: AtomicU32,
    mutation_calls: AtomicU32,
}

impl FlakyZone {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            inner: MemoryZone::new(),
            remaining_failures: AtomicU32::new(failures),
            mutation_calls: AtomicU32::new(0),
        }
    }

    pub fn mutation_calls(&self) -> u32 {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    fn maybe_fail(&self) -> Result<(), ZoneError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            Err(ZoneError::Transport("connection reset".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ZoneClient for FlakyZone {
    async fn lookup(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ZoneError> {
        self.inner.lookup(hostname).await
    }

    async fn upsert(&self, hostname: &str, ip: Ipv4Addr, ttl: u32) -> Result<(), ZoneError> {
        self.maybe_fail()?;
        self.inner.upsert(hostname, ip, ttl).await
    }

    async fn delete(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), ZoneError> {
        self.maybe_fail()?;
        self.inner.delete(hostname, ip).await
    }
}

/// Zone that permanently rejects mutations for the listed hostnames and
/// delegates everything else. Exercises failure aggregation.
#[derive(Debug)]
pub struct SelectiveZone {
    inner: MemoryZone,
    rejected: Vec<String>,
}

impl SelectiveZone {
    pub fn rejecting(hostnames: &[&str]) -> Self {
        Self {
            inner: MemoryZone::new(),
            rejected: hostnames.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn inner(&self) -> &MemoryZone {
        &self.inner
    }

    fn check(&self, hostname: &str) -> Result<(), ZoneError> {
        if self.rejected.iter().any(|h| h == hostname) {
            Err(ZoneError::Backend(format!("{} is throttled", hostname)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ZoneClient for SelectiveZone {
    async fn lookup(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ZoneError> {
        self.inner.lookup(hostname).await
    }

    async fn upsert(&self, hostname: &str, ip: Ipv4Addr, ttl: u32) -> Result<(), ZoneError> {
        self.check(hostname)?;
        self.inner.upsert(hostname, ip, ttl).await
    }

    async fn delete(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), ZoneError> {
        self.check(hostname)?;
        self.inner.delete(hostname, ip).await
    }
}

// --- Wiring ---

pub struct Harness {
    pub directory: Arc<MemoryDirectory>,
    pub zone: Arc<MemoryZone>,
    pub locks: Arc<MemoryLockStore>,
    pub ack: Arc<RecordingAcknowledger>,
    pub reconciler: Reconciler,
}

/// Standard harness: memory adapters all the way down.
pub fn harness(config: Config) -> Harness {
    let directory = Arc::new(MemoryDirectory::new());
    let zone = Arc::new(MemoryZone::new());
    let locks = Arc::new(MemoryLockStore::new());
    let ack = Arc::new(RecordingAcknowledger::new());
    let reconciler = Reconciler::new(
        config,
        Arc::clone(&directory) as Arc<dyn MemberDirectory>,
        Arc::clone(&zone) as Arc<dyn ZoneClient>,
        Arc::clone(&locks) as Arc<dyn LockStore>,
        Arc::clone(&ack) as Arc<dyn LifecycleAcknowledger>,
    );
    Harness {
        directory,
        zone,
        locks,
        ack,
        reconciler,
    }
}
