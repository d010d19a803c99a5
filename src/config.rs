use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::hostname::{is_valid_label, HostnameSource};
use crate::retry::RetryPolicy;

/// Zone lock tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease duration granted on acquire, in seconds. A crashed holder
    /// blocks the zone for at most this long.
    pub lease_secs: u64,
    /// Total time one event may spend waiting for the lock, in seconds.
    pub wait_budget_secs: u64,
    /// Backoff between acquire attempts while the lock is held elsewhere.
    pub backoff: RetryPolicy,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_secs: 30,
            wait_budget_secs: 25,
            backoff: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 250,
                max_delay_ms: 5_000,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identifier of the DNS zone all records live in. Also the lock key.
    pub zone_id: String,
    /// Zone name, for logging and record FQDN display.
    pub zone_name: String,
    /// Hostname configuration: a literal label, or one of the reserved
    /// tokens `_PrivateDnsName_` / `_PublicDnsName_`.
    pub hostname: String,
    /// Prefixes substituted for the `ip` segment of IP-derived hostnames.
    pub hostname_prefixes: Vec<String>,
    /// Publish the public IP instead of the private one.
    pub public_ip: bool,
    /// TTL for created records, in seconds.
    pub ttl: u32,
    /// Whether to acknowledge the launch-phase handshake.
    pub acknowledge_join: bool,
    /// Whether to acknowledge the terminate-phase handshake.
    pub acknowledge_leave: bool,
    /// Wall-clock budget for handling one event, in seconds.
    pub event_budget_secs: u64,
    /// Zone lock tuning.
    pub lock: LockConfig,
    /// Retry policy for directory and zone calls.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            zone_id: String::new(),
            zone_name: String::new(),
            hostname: crate::hostname::PRIVATE_NAME_TOKEN.into(),
            hostname_prefixes: vec!["ip".into()],
            public_ip: false,
            ttl: 300,
            acknowledge_join: true,
            acknowledge_leave: true,
            event_budget_secs: 60,
            lock: LockConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("fleetdns.toml"))
            .merge(Json::file("fleetdns.json"))
            .merge(Env::prefixed("FLEETDNS_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent configuration before any event is handled.
    /// Hostname grammar and duplicate prefixes are checked here once;
    /// the resolver trusts them afterwards.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.zone_id.is_empty() {
            anyhow::bail!("zone_id must be set");
        }
        if self.ttl == 0 {
            anyhow::bail!("ttl must be positive");
        }
        if let HostnameSource::Literal(name) = self.hostname_source() {
            if !is_valid_label(&name) {
                anyhow::bail!("hostname {:?} is not a valid DNS label", name);
            }
        }
        if self.hostname_prefixes.is_empty() {
            anyhow::bail!("hostname_prefixes must not be empty");
        }
        let mut seen = HashSet::new();
        for prefix in &self.hostname_prefixes {
            if !is_valid_label(prefix) {
                anyhow::bail!("hostname prefix {:?} is not a valid DNS label", prefix);
            }
            if !seen.insert(prefix.as_str()) {
                anyhow::bail!("duplicate hostname prefix {:?}", prefix);
            }
        }
        if self.lock.lease_secs == 0 {
            anyhow::bail!("lock.lease_secs must be positive");
        }
        Ok(())
    }

    /// The hostname source this deployment resolves names from.
    pub fn hostname_source(&self) -> HostnameSource {
        HostnameSource::parse(&self.hostname)
    }

    /// Wall-clock budget for one event.
    pub fn event_budget(&self) -> Duration {
        Duration::from_secs(self.event_budget_secs)
    }

    /// Lease granted on every lock acquire.
    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.lock.lease_secs)
    }

    /// Upper bound on time spent waiting for the zone lock.
    pub fn lock_wait_budget(&self) -> Duration {
        Duration::from_secs(self.lock.wait_budget_secs)
    }
}
