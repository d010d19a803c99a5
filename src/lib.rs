//! fleetdns - keeps DNS A-records in step with an elastic fleet.
//!
//! When a fleet member launches, a record mapping its hostname to its
//! address must appear in the configured zone; when it terminates, the
//! record must disappear. Members come and go concurrently, so every
//! lifecycle event runs the same reconciliation pipeline:
//!
//! ```text
//! event ──▶ resolve hostnames + IP ──▶ acquire zone lock
//!                                           │
//!                       upsert/delete records, cache IP tag
//!                                           │
//!                release lock ──▶ acknowledge handshake (continue/abandon)
//! ```
//!
//! External collaborators (member directory, DNS zone, lock store,
//! lifecycle acknowledger) sit behind async traits; in-memory
//! implementations back tests and local dry runs.

pub mod config;
pub mod directory;
pub mod dns;
pub mod error;
pub mod hostname;
pub mod lifecycle;
pub mod lock;
pub mod reconcile;
pub mod retry;
pub mod types;

pub use config::{Config, LockConfig};
pub use directory::{MemberDirectory, MemoryDirectory};
pub use dns::{MemoryZone, ZoneClient};
pub use error::{DirectoryError, LockError, ReconcileError, ZoneError};
pub use hostname::HostnameSource;
pub use lifecycle::{LifecycleAcknowledger, NoopAcknowledger};
pub use lock::{AcquireOutcome, LockStore, MemoryLockStore, ReleaseOutcome};
pub use reconcile::Reconciler;
pub use retry::RetryPolicy;
pub use types::{LifecycleEvent, Member, Transition};
