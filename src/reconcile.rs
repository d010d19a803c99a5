//! The reconciliation handler.
//!
//! One lifecycle event moves through `Start -> LockPending -> Locked ->
//! Mutating -> Unlocking -> Acknowledging -> Done`. Every step tolerates
//! redelivery of the same event: upserts and deletes are idempotent, and
//! each lock attempt uses a fresh holder token. The lock is released on
//! every path that acquired it, including mutation failures and budget
//! timeouts.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use tokio::time::timeout;

use crate::config::Config;
use crate::directory::MemberDirectory;
use crate::dns::ZoneClient;
use crate::error::{DirectoryError, OperationFailure, ReconcileError};
use crate::hostname;
use crate::lifecycle::LifecycleAcknowledger;
use crate::lock::{self, LockStore, ReleaseOutcome};
use crate::retry::with_retries;
use crate::types::{LifecycleEvent, Member, Transition, PRIVATE_IP_TAG, PUBLIC_IP_TAG};

/// Time reserved out of the event budget for lock release and the
/// acknowledgement call.
const CLEANUP_MARGIN: Duration = Duration::from_secs(5);

fn family(public: bool) -> &'static str {
    if public {
        "public"
    } else {
        "private"
    }
}

/// Orchestrates one lifecycle event end to end.
///
/// Invocations are stateless and independent; two events for the same
/// zone serialize through the zone lock, events for different zones run
/// fully in parallel. Two in-flight events for the *same* member are
/// only serialized at zone granularity (accepted race, the orchestrator
/// does not overlap a member's launch and terminate hooks).
pub struct Reconciler {
    config: Config,
    directory: Arc<dyn MemberDirectory>,
    zone: Arc<dyn ZoneClient>,
    locks: Arc<dyn LockStore>,
    acknowledger: Arc<dyn LifecycleAcknowledger>,
}

impl Reconciler {
    /// Build a reconciler over the four external collaborators.
    pub fn new(
        config: Config,
        directory: Arc<dyn MemberDirectory>,
        zone: Arc<dyn ZoneClient>,
        locks: Arc<dyn LockStore>,
        acknowledger: Arc<dyn LifecycleAcknowledger>,
    ) -> Self {
        Self {
            config,
            directory,
            zone,
            locks,
            acknowledger,
        }
    }

    /// Handle one lifecycle event and acknowledge the handshake.
    ///
    /// On success the orchestrator is told to continue the transition;
    /// on failure it is told to abandon it so the event is redelivered
    /// or escalated. A failed acknowledgement never rolls back the DNS
    /// mutation.
    pub async fn handle(&self, event: &LifecycleEvent) -> Result<(), ReconcileError> {
        info!(
            "handling {:?} for member {} in zone {}",
            event.transition, event.member_id, self.config.zone_id
        );
        let result = self.reconcile(event).await;

        let ack_enabled = match event.transition {
            Transition::Joining => self.config.acknowledge_join,
            Transition::Leaving => self.config.acknowledge_leave,
        };

        match &result {
            Ok(()) => {
                info!(
                    "reconciled {:?} for member {}",
                    event.transition, event.member_id
                );
                if ack_enabled {
                    if let Err(err) = self.acknowledger.complete(&event.token).await {
                        error!("complete call failed for token {}: {}", event.token, err);
                        return Err(ReconcileError::Acknowledgement(err.to_string()));
                    }
                }
            }
            Err(err) => {
                error!(
                    "reconcile failed for member {}: {}",
                    event.member_id, err
                );
                if ack_enabled {
                    let reason = err.to_string();
                    if let Err(ack_err) = self.acknowledger.abandon(&event.token, &reason).await {
                        error!("abandon call failed for token {}: {}", event.token, ack_err);
                    }
                }
            }
        }
        result
    }

    /// Resolve, lock, mutate, unlock.
    async fn reconcile(&self, event: &LifecycleEvent) -> Result<(), ReconcileError> {
        let deadline = Instant::now() + self.config.event_budget();

        let member = self.fetch_member(&event.member_id).await?;
        let effective_ip = self.effective_ip(event, &member)?;
        let hostnames = hostname::resolve(
            &member,
            &self.config.hostname_source(),
            &self.config.hostname_prefixes,
            Some(effective_ip),
        )?;
        debug!(
            "member {} resolves to {:?} -> {}",
            member.id, hostnames, effective_ip
        );

        // LockPending: never wait past the point where cleanup and ack
        // would no longer fit in the event budget.
        let remaining = deadline.saturating_duration_since(Instant::now());
        let lock_wait = self
            .config
            .lock_wait_budget()
            .min(remaining.saturating_sub(CLEANUP_MARGIN));
        let token = lock::acquire_with_backoff(
            self.locks.as_ref(),
            &self.config.zone_id,
            &event.member_id,
            &event.token,
            self.config.lock_lease(),
            lock_wait,
            &self.config.lock.backoff,
        )
        .await?;

        // Mutating, bounded by what is left of the event budget.
        let mutation_budget = deadline
            .saturating_duration_since(Instant::now())
            .saturating_sub(CLEANUP_MARGIN);
        let result = match timeout(
            mutation_budget,
            self.mutate(event, &member, &hostnames, effective_ip),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::HostnameOperation {
                failures: vec![OperationFailure {
                    target: "event budget".into(),
                    error: format!("mutation phase exceeded {:?}", mutation_budget),
                }],
            }),
        };

        // Unlocking: runs regardless of the mutation outcome.
        match self.locks.release(&self.config.zone_id, &token).await {
            Ok(ReleaseOutcome::Released) => {
                debug!("released lock on zone {}", self.config.zone_id);
            }
            Ok(ReleaseOutcome::NotHeld) => {
                warn!(
                    "lock on zone {} was no longer held at release; lease likely expired",
                    self.config.zone_id
                );
            }
            Err(err) => {
                warn!(
                    "failed to release lock on zone {}: {}; lease expiry will clear it",
                    self.config.zone_id, err
                );
            }
        }

        result
    }

    /// Fetch the member, retrying transport errors only. An unknown
    /// member is a terminal resolution failure.
    async fn fetch_member(&self, member_id: &str) -> Result<Member, ReconcileError> {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            match self.directory.get(member_id).await {
                Ok(member) => return Ok(member),
                Err(DirectoryError::NotFound(id)) => {
                    return Err(ReconcileError::Resolution {
                        member_id: id,
                        reason: "member not found in directory".into(),
                    });
                }
                Err(err @ DirectoryError::Transport(_)) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts.max(1) {
                        return Err(ReconcileError::Directory(err.to_string()));
                    }
                    let delay = policy.delay(attempt - 1);
                    warn!(
                        "directory get for {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        member_id, attempt, policy.max_attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Settle the address this event operates on. Joining requires the
    /// live address; leaving may fall back to the IP cached in the
    /// member's tags, since the platform often revokes the address
    /// before the terminate hook fires.
    fn effective_ip(
        &self,
        event: &LifecycleEvent,
        member: &Member,
    ) -> Result<Ipv4Addr, ReconcileError> {
        let public = self.config.public_ip;
        let live = member.ip(public);
        match event.transition {
            Transition::Joining => live.ok_or_else(|| ReconcileError::Resolution {
                member_id: member.id.clone(),
                reason: format!("no {} IP while joining", family(public)),
            }),
            Transition::Leaving => {
                live.or_else(|| member.cached_ip(public)).ok_or_else(|| {
                    ReconcileError::Resolution {
                        member_id: member.id.clone(),
                        reason: format!(
                            "no live {} IP and no cached tag; cannot form the record to delete",
                            family(public)
                        ),
                    }
                })
            }
        }
    }

    /// Apply the record mutations for this event, aggregating
    /// per-hostname failures rather than stopping at the first one.
    async fn mutate(
        &self,
        event: &LifecycleEvent,
        member: &Member,
        hostnames: &[String],
        ip: Ipv4Addr,
    ) -> Result<(), ReconcileError> {
        let mut failures = Vec::new();
        match event.transition {
            Transition::Joining => {
                for host in hostnames {
                    match with_retries(&self.config.retry, "record upsert", || {
                        self.zone.upsert(host, ip, self.config.ttl)
                    })
                    .await
                    {
                        Ok(()) => {
                            info!(
                                "record {}.{} -> {} (ttl {})",
                                host, self.config.zone_name, ip, self.config.ttl
                            );
                        }
                        Err(err) => failures.push(OperationFailure {
                            target: host.clone(),
                            error: err.to_string(),
                        }),
                    }
                }

                // Cache the address only once every record is in place,
                // so a cached tag always implies the records existed.
                if failures.is_empty() {
                    let tag_key = if self.config.public_ip {
                        PUBLIC_IP_TAG
                    } else {
                        PRIVATE_IP_TAG
                    };
                    let mut tags = HashMap::new();
                    tags.insert(tag_key.to_string(), ip.to_string());
                    if let Err(err) = with_retries(&self.config.retry, "tag write", || {
                        self.directory.set_tags(&event.member_id, tags.clone())
                    })
                    .await
                    {
                        failures.push(OperationFailure {
                            target: format!("tag {}", tag_key),
                            error: err.to_string(),
                        });
                    } else {
                        debug!("cached {}={} on member {}", tag_key, ip, member.id);
                    }
                }
            }
            Transition::Leaving => {
                for host in hostnames {
                    match with_retries(&self.config.retry, "record delete", || {
                        self.zone.delete(host, ip)
                    })
                    .await
                    {
                        Ok(()) => {
                            info!("record {}.{} removed", host, self.config.zone_name);
                        }
                        Err(err) => failures.push(OperationFailure {
                            target: host.clone(),
                            error: err.to_string(),
                        }),
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::HostnameOperation { failures })
        }
    }
}
