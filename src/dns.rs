//! DNS zone client adapter.
//!
//! All operations are scoped to the single zone the client was built
//! for. Upsert is an overwrite (one authoritative A value per hostname)
//! and delete is a no-op when the record is already gone, which keeps
//! both safe under retries and event redelivery.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::error::ZoneError;

/// Record mutations against one DNS zone.
#[async_trait]
pub trait ZoneClient: Send + Sync {
    /// Current A values for a hostname; empty when no record exists.
    async fn lookup(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ZoneError>;

    /// Create or overwrite the A record for `hostname`.
    async fn upsert(&self, hostname: &str, ip: Ipv4Addr, ttl: u32) -> Result<(), ZoneError>;

    /// Delete the A record for `hostname` if its value matches `ip`.
    /// Succeeds when the record is absent.
    async fn delete(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), ZoneError>;
}

/// In-memory zone, used by tests and local dry runs.
#[derive(Debug, Default)]
pub struct MemoryZone {
    records: Mutex<HashMap<String, (Ipv4Addr, u32)>>,
}

impl MemoryZone {
    /// Create an empty zone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently in the zone.
    pub fn len(&self) -> usize {
        self.records.lock().expect("zone mutex poisoned").len()
    }

    /// Whether the zone holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ZoneClient for MemoryZone {
    async fn lookup(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ZoneError> {
        let records = self.records.lock().expect("zone mutex poisoned");
        Ok(records
            .get(hostname)
            .map(|(ip, _)| vec![*ip])
            .unwrap_or_default())
    }

    async fn upsert(&self, hostname: &str, ip: Ipv4Addr, ttl: u32) -> Result<(), ZoneError> {
        let mut records = self.records.lock().expect("zone mutex poisoned");
        debug!("upsert {} -> {} (ttl {})", hostname, ip, ttl);
        records.insert(hostname.to_string(), (ip, ttl));
        Ok(())
    }

    async fn delete(&self, hostname: &str, ip: Ipv4Addr) -> Result<(), ZoneError> {
        let mut records = self.records.lock().expect("zone mutex poisoned");
        match records.get(hostname) {
            Some((current, _)) if *current == ip => {
                debug!("delete {} -> {}", hostname, ip);
                records.remove(hostname);
            }
            Some((current, _)) => {
                // Record now points elsewhere; another member owns it.
                debug!(
                    "skip delete {}: holds {} rather than {}",
                    hostname, current, ip
                );
            }
            None => {
                debug!("delete {}: already absent", hostname);
            }
        }
        Ok(())
    }
}
