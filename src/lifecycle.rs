//! Lifecycle handshake adapter.
//!
//! The fleet orchestrator holds a member in a pending state until the
//! handler answers: `complete` lets the transition finish, `abandon`
//! tells the orchestrator to retry or escalate. Either phase can be
//! configured without a handshake, in which case [`NoopAcknowledger`]
//! stands in.

use async_trait::async_trait;
use log::info;

use crate::error::AckError;

/// Two-phase lifecycle acknowledgement boundary.
#[async_trait]
pub trait LifecycleAcknowledger: Send + Sync {
    /// Signal that the pending transition may complete.
    async fn complete(&self, token: &str) -> Result<(), AckError>;

    /// Signal that the pending transition should be abandoned and
    /// eventually redelivered or escalated.
    async fn abandon(&self, token: &str, reason: &str) -> Result<(), AckError>;
}

/// Acknowledger for deployments where the orchestrator does not wait on
/// a handshake. Logs and succeeds.
#[derive(Debug, Default)]
pub struct NoopAcknowledger;

#[async_trait]
impl LifecycleAcknowledger for NoopAcknowledger {
    async fn complete(&self, token: &str) -> Result<(), AckError> {
        info!("handshake disabled, skipping complete for token {}", token);
        Ok(())
    }

    async fn abandon(&self, token: &str, reason: &str) -> Result<(), AckError> {
        info!(
            "handshake disabled, skipping abandon for token {} ({})",
            token, reason
        );
        Ok(())
    }
}
