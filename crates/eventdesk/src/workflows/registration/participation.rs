use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{EventId, EventView, UserId, UserRole};
use super::store::{EventStore, StoreError, UserStore};

/// Default bound on user-side back-reference retries before a partial
/// failure is surfaced.
pub const DEFAULT_BACKREF_RETRIES: u32 = 3;

/// Maintains the bidirectional marketer membership between the Event and
/// User aggregates. The two writes cannot be wrapped in one transaction, so
/// the event side is written first and the user-side back-reference is
/// retried to convergence; divergence that outlives the retries is reported
/// as a partial failure for [`ParticipationCoordinator::reconcile`] to repair.
pub struct ParticipationCoordinator<E, U> {
    events: Arc<E>,
    users: Arc<U>,
    backref_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackrefWrite {
    Add,
    Remove,
}

impl BackrefWrite {
    fn verb(self) -> &'static str {
        match self {
            BackrefWrite::Add => "add",
            BackrefWrite::Remove => "remove",
        }
    }
}

impl<E, U> ParticipationCoordinator<E, U>
where
    E: EventStore + 'static,
    U: UserStore + 'static,
{
    pub fn new(events: Arc<E>, users: Arc<U>) -> Self {
        Self::with_retry_limit(events, users, DEFAULT_BACKREF_RETRIES)
    }

    pub fn with_retry_limit(events: Arc<E>, users: Arc<U>, backref_retries: u32) -> Self {
        Self {
            events,
            users,
            backref_retries,
        }
    }

    /// Add `user_id` to the event's marketer set and mirror the event into
    /// the user's participation set. Joining an event the user already
    /// participates in is an idempotent success.
    pub fn join(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> Result<EventView, ParticipationError> {
        let user = self
            .users
            .fetch(user_id)?
            .ok_or_else(|| ParticipationError::UserNotFound(user_id.clone()))?;
        if user.role != UserRole::Marketer {
            return Err(ParticipationError::NotAMarketer {
                user: user_id.clone(),
                role: user.role,
            });
        }

        match self.events.add_marketer(event_id, user_id) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(ParticipationError::EventNotFound(event_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }

        // Run the back-reference write even when the marketer set was
        // unchanged, so a repeat join heals an earlier partial failure.
        self.converge_backref(user_id, event_id, BackrefWrite::Add)?;
        self.refreshed_view(event_id)
    }

    /// Remove `user_id` from the event's marketer set and the event from the
    /// user's participation set. Removing a non-member is an idempotent
    /// success. No role gate: a user demoted after joining must still be
    /// removable.
    pub fn leave(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> Result<EventView, ParticipationError> {
        match self.events.remove_marketer(event_id, user_id) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(ParticipationError::EventNotFound(event_id.clone()))
            }
            Err(err) => return Err(err.into()),
        }

        self.converge_backref(user_id, event_id, BackrefWrite::Remove)?;
        self.refreshed_view(event_id)
    }

    /// Re-assert the bidirectional membership invariant across all stored
    /// documents, treating the Event aggregate as authoritative: user-side
    /// back-references are added where missing and removed where stale
    /// (including references to events that no longer exist).
    pub fn reconcile(&self) -> Result<ReconcileReport, ParticipationError> {
        let events = self.events.scan()?;
        let users = self.users.scan()?;

        let mut expected: HashMap<UserId, HashSet<EventId>> = HashMap::new();
        for event in &events {
            for marketer in &event.marketers {
                expected
                    .entry(marketer.clone())
                    .or_default()
                    .insert(event.id.clone());
            }
        }

        let mut report = ReconcileReport {
            scanned_events: events.len(),
            scanned_users: users.len(),
            ..ReconcileReport::default()
        };

        for user in &users {
            let should = expected.remove(&user.id).unwrap_or_default();
            for event in &should {
                if !user.participates_in(event) {
                    self.users.add_participation(&user.id, event)?;
                    warn!(user = %user.id, event = %event, "repaired missing participation back-reference");
                    report.added_backrefs += 1;
                }
            }
            for event in &user.event_participation {
                if !should.contains(event) {
                    self.users.remove_participation(&user.id, event)?;
                    warn!(user = %user.id, event = %event, "removed stale participation back-reference");
                    report.removed_backrefs += 1;
                }
            }
        }

        for (user, events) in expected {
            warn!(user = %user, listed_on = events.len(), "marketer listed on events has no user document");
            report.orphaned_marketers += 1;
        }

        info!(
            scanned_events = report.scanned_events,
            scanned_users = report.scanned_users,
            added = report.added_backrefs,
            removed = report.removed_backrefs,
            "participation reconciliation completed"
        );
        Ok(report)
    }

    fn converge_backref(
        &self,
        user: &UserId,
        event: &EventId,
        write: BackrefWrite,
    ) -> Result<(), ParticipationError> {
        let mut last_error = None;
        for attempt in 0..=self.backref_retries {
            let result = match write {
                BackrefWrite::Add => self.users.add_participation(user, event),
                BackrefWrite::Remove => self.users.remove_participation(user, event),
            };
            match result {
                Ok(_) => {
                    if attempt > 0 {
                        info!(user = %user, event = %event, attempt, op = write.verb(), "participation back-reference converged after retry");
                    }
                    return Ok(());
                }
                // Nothing left to remove from; the invariant already holds.
                Err(StoreError::NotFound) if write == BackrefWrite::Remove => return Ok(()),
                Err(err) => {
                    warn!(user = %user, event = %event, attempt, op = write.verb(), error = %err, "participation back-reference write failed");
                    let retryable = !matches!(err, StoreError::NotFound);
                    last_error = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        Err(ParticipationError::PartialFailure {
            event: event.clone(),
            user: user.clone(),
            source: last_error.unwrap_or_else(|| StoreError::Unavailable("no attempt made".into())),
        })
    }

    fn refreshed_view(&self, event_id: &EventId) -> Result<EventView, ParticipationError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or_else(|| ParticipationError::EventNotFound(event_id.clone()))?;
        Ok(event.view())
    }
}

/// Counters from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned_events: usize,
    pub scanned_users: usize,
    pub added_backrefs: usize,
    pub removed_backrefs: usize,
    /// Marketer ids found on events with no corresponding user document.
    pub orphaned_marketers: usize,
}

/// Error raised by the participation coordinator.
#[derive(Debug, thiserror::Error)]
pub enum ParticipationError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("user {user} holds role {} and cannot participate as a marketer", .role.label())]
    NotAMarketer { user: UserId, role: UserRole },
    #[error("event {event} was updated but the back-reference on user {user} was not applied")]
    PartialFailure {
        event: EventId,
        user: UserId,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
