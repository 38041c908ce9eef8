use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for event aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

/// Identifier wrapper for user aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier for a concierge request, unique within its owning event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for attendee registration records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendeeId(pub String);

/// Phone number as registered; identity component of an attendee record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(pub String);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AttendeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed role set assigned by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Marketer,
    Concierge,
    Admin,
    Attendee,
}

impl UserRole {
    pub const fn label(self) -> &'static str {
        match self {
            UserRole::Marketer => "marketer",
            UserRole::Concierge => "concierge",
            UserRole::Admin => "admin",
            UserRole::Attendee => "attendee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "marketer" => Some(UserRole::Marketer),
            "concierge" => Some(UserRole::Concierge),
            "admin" => Some(UserRole::Admin),
            "attendee" => Some(UserRole::Attendee),
            _ => None,
        }
    }
}

/// Lifecycle of a concierge assignment request. `Approved` and `Rejected`
/// are terminal; a pending request can also be removed by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

/// Assignment request embedded in its owning event document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConciergeRequest {
    pub id: RequestId,
    pub user: UserId,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<UserId>,
}

impl ConciergeRequest {
    pub fn view(&self) -> RequestView {
        RequestView {
            id: self.id.clone(),
            user: self.user.clone(),
            status: self.status.label(),
            requested_at: self.requested_at,
            reviewed_at: self.reviewed_at,
            reviewed_by: self.reviewed_by.clone(),
        }
    }
}

/// Descriptive lifecycle of an event; carries no engine invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Draft,
    Published,
    Closed,
}

impl EventState {
    pub const fn label(self) -> &'static str {
        match self {
            EventState::Draft => "draft",
            EventState::Published => "published",
            EventState::Closed => "closed",
        }
    }
}

/// Event aggregate root. Marketer membership and the ordered concierge
/// request list are embedded so the store can mutate them atomically with
/// the rest of the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub name: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub capacity: u32,
    pub state: EventState,
    pub marketers: Vec<UserId>,
    pub concierge_requests: Vec<ConciergeRequest>,
}

impl EventRecord {
    pub fn has_marketer(&self, user: &UserId) -> bool {
        self.marketers.contains(user)
    }

    /// First pending request held by `user`, in request order.
    pub fn pending_request_for(&self, user: &UserId) -> Option<&ConciergeRequest> {
        self.concierge_requests
            .iter()
            .find(|request| request.user == *user && request.status == RequestStatus::Pending)
    }

    /// Most recently created request for `user`, regardless of status.
    pub fn latest_request_for(&self, user: &UserId) -> Option<&ConciergeRequest> {
        self.concierge_requests
            .iter()
            .rev()
            .find(|request| request.user == *user)
    }

    pub fn request(&self, id: &RequestId) -> Option<&ConciergeRequest> {
        self.concierge_requests
            .iter()
            .find(|request| request.id == *id)
    }

    pub fn approved_concierge(&self, user: &UserId) -> bool {
        self.concierge_requests
            .iter()
            .any(|request| request.user == *user && request.status == RequestStatus::Approved)
    }

    pub fn view(&self) -> EventView {
        EventView {
            id: self.id.clone(),
            name: self.name.clone(),
            venue: self.venue.clone(),
            starts_at: self.starts_at,
            capacity: self.capacity,
            state: self.state.label(),
            marketers: self.marketers.clone(),
            concierge_requests: self
                .concierge_requests
                .iter()
                .map(ConciergeRequest::view)
                .collect(),
        }
    }
}

/// User aggregate. `event_participation` is the marketer-side back-reference
/// to the events the user participates in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub event_participation: Vec<EventId>,
}

impl UserRecord {
    pub fn participates_in(&self, event: &EventId) -> bool {
        self.event_participation.contains(event)
    }
}

/// One registration per (event, phone). Check-in flips `checked_in`
/// false-to-true exactly once; the stamp fields are present only after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    pub id: AttendeeId,
    pub event: EventId,
    pub phone: PhoneNumber,
    pub name: String,
    pub checked_in: bool,
    pub checked_in_by: Option<UserId>,
    pub checked_in_time: Option<DateTime<Utc>>,
}

/// Authenticated caller identity handed in by the upstream gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

/// Sanitized representation of a concierge request for API responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    pub id: RequestId,
    pub user: UserId,
    pub status: &'static str,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
}

/// Refreshed event snapshot returned by the participation operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventView {
    pub id: EventId,
    pub name: String,
    pub venue: String,
    pub starts_at: DateTime<Utc>,
    pub capacity: u32,
    pub state: &'static str,
    pub marketers: Vec<UserId>,
    pub concierge_requests: Vec<RequestView>,
}

/// Event header used in cross-event listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: EventId,
    pub name: String,
    pub starts_at: DateTime<Utc>,
}

/// User header used in cross-event listings. `name`/`role` are absent when
/// the referenced user document no longer exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
}
