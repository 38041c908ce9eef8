use chrono::{DateTime, Utc};

use super::domain::{
    AttendeeId, AttendeeRecord, ConciergeRequest, EventId, EventRecord, PhoneNumber, RequestId,
    RequestStatus, UserId, UserRecord,
};

/// Error enumeration for store adapter failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document already exists")]
    Conflict,
    #[error("document not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a conditional set-membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipWrite {
    Applied,
    Unchanged,
}

/// Outcome of the append-unless-pending request write.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestAppend {
    Appended,
    /// A pending request already exists for the same (event, user) pair.
    PendingExists(RequestId),
}

/// Outcome of moving a request to a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestSettle {
    Settled(ConciergeRequest),
    /// The request exists but is no longer pending.
    AlreadySettled(RequestStatus),
    /// No request with that id exists on the event.
    Missing,
}

/// Outcome of the conditional check-in write.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckInWrite {
    Applied,
    /// The record was already checked in; carries the untouched record so
    /// callers can report who performed the original check-in.
    AlreadyCheckedIn(AttendeeRecord),
}

/// Access to the Event aggregate. Every mutating method is applied by the
/// adapter as a single atomic document operation: the precondition and the
/// mutation are evaluated in one indivisible step against the current
/// document, never as a separate read followed by a write.
pub trait EventStore: Send + Sync {
    fn insert(&self, event: EventRecord) -> Result<(), StoreError>;
    fn fetch(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError>;
    fn scan(&self) -> Result<Vec<EventRecord>, StoreError>;

    /// Add `user` to the marketer set unless already present.
    fn add_marketer(&self, id: &EventId, user: &UserId) -> Result<MembershipWrite, StoreError>;

    /// Remove `user` from the marketer set; unchanged when absent.
    fn remove_marketer(&self, id: &EventId, user: &UserId) -> Result<MembershipWrite, StoreError>;

    /// Append `request` only if the event holds no pending request for the
    /// same user.
    fn append_request_unless_pending(
        &self,
        id: &EventId,
        request: ConciergeRequest,
    ) -> Result<RequestAppend, StoreError>;

    /// Move a pending request to `status`, stamping the reviewer identity
    /// and time. Requests already in a terminal status are left untouched.
    fn settle_request(
        &self,
        id: &EventId,
        request: &RequestId,
        status: RequestStatus,
        reviewer: &UserId,
        reviewed_at: DateTime<Utc>,
    ) -> Result<RequestSettle, StoreError>;

    /// Remove the first pending request held by `user`, returning it.
    fn remove_pending_request(
        &self,
        id: &EventId,
        user: &UserId,
    ) -> Result<Option<ConciergeRequest>, StoreError>;
}

/// Access to the User aggregate and its participation back-references.
pub trait UserStore: Send + Sync {
    fn insert(&self, user: UserRecord) -> Result<(), StoreError>;
    fn fetch(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError>;
    fn scan(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Add `event` to the participation set unless already present.
    fn add_participation(&self, id: &UserId, event: &EventId)
        -> Result<MembershipWrite, StoreError>;

    /// Remove `event` from the participation set; unchanged when absent.
    fn remove_participation(
        &self,
        id: &UserId,
        event: &EventId,
    ) -> Result<MembershipWrite, StoreError>;
}

/// Access to attendee registration records, keyed by (event, phone).
pub trait AttendeeStore: Send + Sync {
    fn insert(&self, attendee: AttendeeRecord) -> Result<(), StoreError>;

    /// All records registered under (event, phone), in storage order. The
    /// engine expects at most one; extras are a data-quality signal handled
    /// by the caller.
    fn find_by_event_and_phone(
        &self,
        event: &EventId,
        phone: &PhoneNumber,
    ) -> Result<Vec<AttendeeRecord>, StoreError>;

    /// Set the check-in stamp only if the record is not yet checked in.
    fn mark_checked_in(
        &self,
        id: &AttendeeId,
        concierge: &UserId,
        at: DateTime<Utc>,
    ) -> Result<CheckInWrite, StoreError>;
}
