//! Data structures shared across the daemon.
//!
//! These types are serialised with [`serde`](https://serde.rs/): the
//! [`LifecycleEvent`] arrives as JSON from the fleet orchestrator and the
//! rest describe what the reconciler reads and writes about a fleet
//! member. Fields are kept minimal; anything recomputable (like the
//! hostname set) is not persisted.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Tag key under which a member's private IP is cached for deletion time.
pub const PRIVATE_IP_TAG: &str = "PrivateIpAddress";

/// Tag key under which a member's public IP is cached for deletion time.
pub const PUBLIC_IP_TAG: &str = "PublicIpAddress";

/// Which side of the fleet a lifecycle transition moves a member to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// The member is launching and must appear in DNS before it proceeds.
    Joining,
    /// The member is terminating and must disappear from DNS.
    Leaving,
}

/// One lifecycle notification from the orchestrator.
///
/// Delivery is at-least-once; handling must be idempotent. The `token`
/// correlates the acknowledgement call back to this specific pending
/// transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Opaque member identifier, unique within the fleet.
    pub member_id: String,
    /// Whether the member is joining or leaving.
    pub transition: Transition,
    /// Handshake token for the two-phase lifecycle acknowledgement.
    pub token: String,
}

/// A fleet member as reported by the member directory.
///
/// Both IPs are optional: a terminating member usually has already lost
/// them, which is why the reconciler caches the address in `tags` while
/// the member is alive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Member {
    /// Member identifier.
    pub id: String,
    /// Private IPv4 address, if currently assigned.
    pub private_ip: Option<Ipv4Addr>,
    /// Public IPv4 address, if currently assigned.
    pub public_ip: Option<Ipv4Addr>,
    /// User-assigned display name, if any.
    pub display_name: Option<String>,
    /// Arbitrary key/value tags. The reconciler writes cached IPs here.
    pub tags: HashMap<String, String>,
}

impl Member {
    /// The live address for the given family, if the platform still
    /// reports one.
    pub fn ip(&self, public: bool) -> Option<Ipv4Addr> {
        if public {
            self.public_ip
        } else {
            self.private_ip
        }
    }

    /// The cached address for the given family, read back from tags.
    /// Unparseable tag values are treated as absent.
    pub fn cached_ip(&self, public: bool) -> Option<Ipv4Addr> {
        let key = if public { PUBLIC_IP_TAG } else { PRIVATE_IP_TAG };
        self.tags.get(key).and_then(|v| v.parse().ok())
    }
}
