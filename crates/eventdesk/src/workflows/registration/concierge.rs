use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::domain::{
    Actor, ConciergeRequest, EventId, EventSummary, RequestId, RequestStatus, RequestView, UserId,
    UserRole, UserSummary,
};
use super::store::{EventStore, RequestAppend, RequestSettle, StoreError, UserStore};

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

/// Admin-facing decision over a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    const fn terminal_status(self) -> RequestStatus {
        match self {
            ReviewDecision::Approve => RequestStatus::Approved,
            ReviewDecision::Reject => RequestStatus::Rejected,
        }
    }
}

/// Concierge assignment requests embedded in events: creation, review,
/// cancellation, and cross-event projections.
///
/// The pending-uniqueness invariant lives in the store's
/// append-unless-pending operation, not here; this service supplies the role
/// gates and translates store outcomes into the caller-facing error kinds.
pub struct ConciergeAssignmentService<E, U> {
    events: Arc<E>,
    users: Arc<U>,
}

impl<E, U> ConciergeAssignmentService<E, U>
where
    E: EventStore + 'static,
    U: UserStore + 'static,
{
    pub fn new(events: Arc<E>, users: Arc<U>) -> Self {
        Self { events, users }
    }

    /// File a new assignment request for `user_id`. At most one pending
    /// request may exist per (event, user); terminal requests do not block a
    /// new one, so a concierge may re-request after a rejection.
    pub fn request(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> Result<RequestView, AssignmentError> {
        let user = self
            .users
            .fetch(user_id)?
            .ok_or_else(|| AssignmentError::UserNotFound(user_id.clone()))?;
        if user.role != UserRole::Concierge {
            return Err(AssignmentError::NotAConcierge {
                user: user_id.clone(),
                role: user.role,
            });
        }

        let request = ConciergeRequest {
            id: next_request_id(),
            user: user_id.clone(),
            status: RequestStatus::Pending,
            requested_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
        };
        let view = request.view();

        match self.events.append_request_unless_pending(event_id, request) {
            Ok(RequestAppend::Appended) => Ok(view),
            Ok(RequestAppend::PendingExists(existing)) => Err(AssignmentError::DuplicatePending {
                event: event_id.clone(),
                user: user_id.clone(),
                existing,
            }),
            Err(StoreError::NotFound) => Err(AssignmentError::EventNotFound(event_id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Settle a pending request. A request that already reached a terminal
    /// status is reported as a conflict rather than silently re-settled,
    /// since re-review could mask the earlier decision.
    pub fn review(
        &self,
        event_id: &EventId,
        request_id: &RequestId,
        decision: ReviewDecision,
        reviewer_id: &UserId,
    ) -> Result<RequestView, AssignmentError> {
        let reviewer = self
            .users
            .fetch(reviewer_id)?
            .ok_or_else(|| AssignmentError::UserNotFound(reviewer_id.clone()))?;
        if reviewer.role != UserRole::Admin {
            return Err(AssignmentError::ReviewerNotAdmin {
                user: reviewer_id.clone(),
                role: reviewer.role,
            });
        }

        match self.events.settle_request(
            event_id,
            request_id,
            decision.terminal_status(),
            reviewer_id,
            Utc::now(),
        ) {
            Ok(RequestSettle::Settled(request)) => Ok(request.view()),
            Ok(RequestSettle::AlreadySettled(status)) => Err(AssignmentError::AlreadySettled {
                request: request_id.clone(),
                status,
            }),
            Ok(RequestSettle::Missing) => Err(AssignmentError::RequestNotFound {
                event: event_id.clone(),
                request: request_id.clone(),
            }),
            Err(StoreError::NotFound) => Err(AssignmentError::EventNotFound(event_id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Withdraw the caller's own pending request. When more than one pending
    /// request exists for the pair (a race the store-level uniqueness check
    /// is meant to prevent), the first in request order is removed.
    pub fn cancel(
        &self,
        event_id: &EventId,
        user_id: &UserId,
        actor: &Actor,
    ) -> Result<RequestView, AssignmentError> {
        if actor.user_id != *user_id {
            return Err(AssignmentError::CancelNotOwner {
                user: user_id.clone(),
                actor: actor.user_id.clone(),
            });
        }

        match self.events.remove_pending_request(event_id, user_id) {
            Ok(Some(request)) => Ok(request.view()),
            Ok(None) => Err(AssignmentError::NoPendingRequest {
                event: event_id.clone(),
                user: user_id.clone(),
            }),
            Err(StoreError::NotFound) => Err(AssignmentError::EventNotFound(event_id.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// All pending requests across events, joined with user summaries.
    pub fn list_pending(&self) -> Result<Vec<AssignmentListing>, AssignmentError> {
        self.list_with_status(RequestStatus::Pending)
    }

    /// All approved requests across events, joined with user summaries.
    pub fn list_approved(&self) -> Result<Vec<AssignmentListing>, AssignmentError> {
        self.list_with_status(RequestStatus::Approved)
    }

    /// Status of the most recently created request for (event, user), or
    /// `"none"` when the user never filed one.
    pub fn my_status(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> Result<AssignmentStatusView, AssignmentError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or_else(|| AssignmentError::EventNotFound(event_id.clone()))?;
        let latest = event.latest_request_for(user_id);

        Ok(AssignmentStatusView {
            event: event_id.clone(),
            user: user_id.clone(),
            status: latest.map(|r| r.status.label()).unwrap_or("none"),
            request_id: latest.map(|r| r.id.clone()),
            requested_at: latest.map(|r| r.requested_at),
            reviewed_at: latest.and_then(|r| r.reviewed_at),
        })
    }

    fn list_with_status(
        &self,
        status: RequestStatus,
    ) -> Result<Vec<AssignmentListing>, AssignmentError> {
        let events = self.events.scan()?;
        let mut listings = Vec::new();
        for event in &events {
            for request in event
                .concierge_requests
                .iter()
                .filter(|request| request.status == status)
            {
                let user = match self.users.fetch(&request.user)? {
                    Some(user) => UserSummary {
                        id: user.id,
                        name: Some(user.name),
                        role: Some(user.role.label()),
                    },
                    None => {
                        warn!(user = %request.user, event = %event.id, "assignment request references a user with no document");
                        UserSummary {
                            id: request.user.clone(),
                            name: None,
                            role: None,
                        }
                    }
                };
                listings.push(AssignmentListing {
                    event: EventSummary {
                        id: event.id.clone(),
                        name: event.name.clone(),
                        starts_at: event.starts_at,
                    },
                    request: request.view(),
                    user,
                });
            }
        }
        Ok(listings)
    }
}

/// One (event, request, user) tuple from the cross-event projections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentListing {
    pub event: EventSummary,
    pub request: RequestView,
    pub user: UserSummary,
}

/// Caller-facing status of a user's latest request on one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentStatusView {
    pub event: EventId,
    pub user: UserId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Error raised by the assignment state machine.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("no request {request} on event {event}")]
    RequestNotFound { event: EventId, request: RequestId },
    #[error("no pending request for user {user} on event {event}")]
    NoPendingRequest { event: EventId, user: UserId },
    #[error("user {user} holds role {} and cannot request a concierge assignment", .role.label())]
    NotAConcierge { user: UserId, role: UserRole },
    #[error("user {user} holds role {} and cannot review assignment requests", .role.label())]
    ReviewerNotAdmin { user: UserId, role: UserRole },
    #[error("request belongs to user {user}; caller {actor} cannot cancel it")]
    CancelNotOwner { user: UserId, actor: UserId },
    #[error("a pending request ({existing}) already exists for user {user} on event {event}")]
    DuplicatePending {
        event: EventId,
        user: UserId,
        existing: RequestId,
    },
    #[error("request {request} was already settled as {}", .status.label())]
    AlreadySettled {
        request: RequestId,
        status: RequestStatus,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
