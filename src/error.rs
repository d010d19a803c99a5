//! Error types for fleetdns.

use std::time::Duration;

use thiserror::Error;

/// One failed record operation, kept for the aggregated abandon reason.
#[derive(Debug, Clone)]
pub struct OperationFailure {
    /// What the operation targeted (a hostname, or the member tag key).
    pub target: String,
    /// Final error after retries were exhausted.
    pub error: String,
}

impl std::fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

/// Terminal outcome of handling one lifecycle event.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A hostname or record key could not be formed: a required IP is
    /// missing and no cached tag covers it. Fatal for this event.
    #[error("cannot resolve member {member_id}: {reason}")]
    Resolution {
        /// Member the event referred to.
        member_id: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The member directory stayed unreachable for all retry attempts.
    /// Redelivery may succeed.
    #[error("member directory unavailable: {0}")]
    Directory(String),

    /// The zone lock stayed held by another invocation for the whole
    /// wait budget. Redelivery may succeed.
    #[error("zone lock not acquired within {waited:?}")]
    LockTimeout {
        /// Total time spent waiting on the lock.
        waited: Duration,
    },

    /// One or more record mutations (or the fallback tag write) failed
    /// after bounded retries. Partial state is acceptable: every
    /// operation is idempotent and redelivery re-applies the rest.
    #[error("{} record operation(s) failed: {}", .failures.len(), format_failures(.failures))]
    HostnameOperation {
        /// Per-target failures, aggregated across the hostname set.
        failures: Vec<OperationFailure>,
    },

    /// The lifecycle handshake call itself failed. The DNS mutation is
    /// not rolled back; it is idempotent and safe to have applied.
    #[error("lifecycle acknowledgement failed: {0}")]
    Acknowledgement(String),
}

impl ReconcileError {
    /// Whether redelivering the same event could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Directory(_)
                | ReconcileError::LockTimeout { .. }
                | ReconcileError::HostnameOperation { .. }
        )
    }
}

fn format_failures(failures: &[OperationFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Member directory failures. `NotFound` and `Transport` are distinct
/// kinds: an absent IP field is an `Option` on the member, never an error.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No member with the given identifier exists.
    #[error("member {0} not found")]
    NotFound(String),

    /// The directory backend could not be reached. Retryable.
    #[error("directory transport error: {0}")]
    Transport(String),
}

/// DNS zone backend failures. All are treated as retryable up to the
/// configured attempt count.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// The zone backend rejected or failed the change.
    #[error("zone backend error: {0}")]
    Backend(String),

    /// The zone backend could not be reached.
    #[error("zone transport error: {0}")]
    Transport(String),
}

/// Lock store transport/backend failures. Contention is *not* an error;
/// it is the `Denied` outcome on acquire.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock backend could not be reached or failed the write.
    #[error("lock backend error: {0}")]
    Backend(String),
}

/// Lifecycle acknowledger failures.
#[derive(Debug, Error)]
pub enum AckError {
    /// The orchestrator rejected or failed the handshake call.
    #[error("acknowledgement error: {0}")]
    Backend(String),
}
