use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::registration::checkin::CheckInService;
use crate::workflows::registration::concierge::{ConciergeAssignmentService, ReviewDecision};
use crate::workflows::registration::domain::{
    Actor, AttendeeId, AttendeeRecord, ConciergeRequest, EventId, EventRecord, EventState,
    PhoneNumber, RequestId, RequestStatus, UserId, UserRecord, UserRole,
};
use crate::workflows::registration::participation::ParticipationCoordinator;
use crate::workflows::registration::router::{registration_router, RegistrationServices};
use crate::workflows::registration::store::{
    AttendeeStore, CheckInWrite, EventStore, MembershipWrite, RequestAppend, RequestSettle,
    StoreError, UserStore,
};

pub(super) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 9, 12, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn event(id: &str) -> EventRecord {
    EventRecord {
        id: EventId(id.to_string()),
        name: format!("{id} expo"),
        venue: "Hall A".to_string(),
        starts_at: start_time(),
        capacity: 500,
        state: EventState::Published,
        marketers: Vec::new(),
        concierge_requests: Vec::new(),
    }
}

pub(super) fn user(id: &str, role: UserRole) -> UserRecord {
    UserRecord {
        id: UserId(id.to_string()),
        name: format!("{id} (test)"),
        role,
        event_participation: Vec::new(),
    }
}

pub(super) fn attendee(id: &str, event: &str, phone: &str) -> AttendeeRecord {
    AttendeeRecord {
        id: AttendeeId(id.to_string()),
        event: EventId(event.to_string()),
        phone: PhoneNumber(phone.to_string()),
        name: format!("{id} (test)"),
        checked_in: false,
        checked_in_by: None,
        checked_in_time: None,
    }
}

pub(super) fn actor(id: &str, role: UserRole) -> Actor {
    Actor {
        user_id: UserId(id.to_string()),
        role,
    }
}

pub(super) const EVENT: &str = "expo-1";
pub(super) const MARKETER: &str = "mara";
pub(super) const CONCIERGE: &str = "cole";
pub(super) const ADMIN: &str = "ada";
pub(super) const PHONE: &str = "+15551234567";

/// Stores seeded with one published event, a marketer, a concierge, an
/// admin, and one registered attendee.
pub(super) fn seeded_stores() -> (Arc<MemoryEvents>, Arc<MemoryUsers>, Arc<MemoryAttendees>) {
    let events = Arc::new(MemoryEvents::default());
    let users = Arc::new(MemoryUsers::default());
    let attendees = Arc::new(MemoryAttendees::default());

    events.insert(event(EVENT)).expect("seed event");
    users
        .insert(user(MARKETER, UserRole::Marketer))
        .expect("seed marketer");
    users
        .insert(user(CONCIERGE, UserRole::Concierge))
        .expect("seed concierge");
    users.insert(user(ADMIN, UserRole::Admin)).expect("seed admin");
    attendees
        .insert(attendee("att-1", EVENT, PHONE))
        .expect("seed attendee");

    (events, users, attendees)
}

pub(super) fn coordinator(
    events: &Arc<MemoryEvents>,
    users: &Arc<MemoryUsers>,
) -> ParticipationCoordinator<MemoryEvents, MemoryUsers> {
    ParticipationCoordinator::new(events.clone(), users.clone())
}

pub(super) fn assignments(
    events: &Arc<MemoryEvents>,
    users: &Arc<MemoryUsers>,
) -> ConciergeAssignmentService<MemoryEvents, MemoryUsers> {
    ConciergeAssignmentService::new(events.clone(), users.clone())
}

pub(super) fn checkin_service(
    events: &Arc<MemoryEvents>,
    attendees: &Arc<MemoryAttendees>,
) -> CheckInService<MemoryEvents, MemoryAttendees> {
    CheckInService::new(events.clone(), attendees.clone())
}

pub(super) fn build_router(
    events: &Arc<MemoryEvents>,
    users: &Arc<MemoryUsers>,
    attendees: &Arc<MemoryAttendees>,
) -> axum::Router {
    let services = Arc::new(RegistrationServices::new(
        events.clone(),
        users.clone(),
        attendees.clone(),
        3,
    ));
    registration_router(services)
}

/// Request-then-approve shortcut used by the check-in tests.
pub(super) fn approve_concierge(
    events: &Arc<MemoryEvents>,
    users: &Arc<MemoryUsers>,
    event_id: &str,
    concierge: &str,
    admin: &str,
) -> RequestId {
    let service = assignments(events, users);
    let view = service
        .request(&EventId(event_id.to_string()), &UserId(concierge.to_string()))
        .expect("request filed");
    service
        .review(
            &EventId(event_id.to_string()),
            &view.id,
            ReviewDecision::Approve,
            &UserId(admin.to_string()),
        )
        .expect("request approved");
    view.id
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[derive(Default, Clone)]
pub(super) struct MemoryEvents {
    docs: Arc<Mutex<BTreeMap<String, EventRecord>>>,
}

impl EventStore for MemoryEvents {
    fn insert(&self, event: EventRecord) -> Result<(), StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        if guard.contains_key(&event.id.0) {
            return Err(StoreError::Conflict);
        }
        guard.insert(event.id.0.clone(), event);
        Ok(())
    }

    fn fetch(&self, id: &EventId) -> Result<Option<EventRecord>, StoreError> {
        let guard = self.docs.lock().expect("event store mutex poisoned");
        Ok(guard.get(&id.0).cloned())
    }

    fn scan(&self) -> Result<Vec<EventRecord>, StoreError> {
        let guard = self.docs.lock().expect("event store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn add_marketer(&self, id: &EventId, user: &UserId) -> Result<MembershipWrite, StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        let event = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if event.has_marketer(user) {
            Ok(MembershipWrite::Unchanged)
        } else {
            event.marketers.push(user.clone());
            Ok(MembershipWrite::Applied)
        }
    }

    fn remove_marketer(&self, id: &EventId, user: &UserId) -> Result<MembershipWrite, StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        let event = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        let before = event.marketers.len();
        event.marketers.retain(|existing| existing != user);
        if event.marketers.len() == before {
            Ok(MembershipWrite::Unchanged)
        } else {
            Ok(MembershipWrite::Applied)
        }
    }

    fn append_request_unless_pending(
        &self,
        id: &EventId,
        request: ConciergeRequest,
    ) -> Result<RequestAppend, StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        let event = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if let Some(existing) = event.pending_request_for(&request.user) {
            return Ok(RequestAppend::PendingExists(existing.id.clone()));
        }
        event.concierge_requests.push(request);
        Ok(RequestAppend::Appended)
    }

    fn settle_request(
        &self,
        id: &EventId,
        request: &RequestId,
        status: RequestStatus,
        reviewer: &UserId,
        reviewed_at: DateTime<Utc>,
    ) -> Result<RequestSettle, StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        let event = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        match event
            .concierge_requests
            .iter_mut()
            .find(|existing| existing.id == *request)
        {
            None => Ok(RequestSettle::Missing),
            Some(existing) if existing.status.is_terminal() => {
                Ok(RequestSettle::AlreadySettled(existing.status))
            }
            Some(existing) => {
                existing.status = status;
                existing.reviewed_at = Some(reviewed_at);
                existing.reviewed_by = Some(reviewer.clone());
                Ok(RequestSettle::Settled(existing.clone()))
            }
        }
    }

    fn remove_pending_request(
        &self,
        id: &EventId,
        user: &UserId,
    ) -> Result<Option<ConciergeRequest>, StoreError> {
        let mut guard = self.docs.lock().expect("event store mutex poisoned");
        let event = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        let position = event
            .concierge_requests
            .iter()
            .position(|existing| existing.user == *user && existing.status == RequestStatus::Pending);
        Ok(position.map(|index| event.concierge_requests.remove(index)))
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryUsers {
    docs: Arc<Mutex<BTreeMap<String, UserRecord>>>,
}

impl UserStore for MemoryUsers {
    fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        let mut guard = self.docs.lock().expect("user store mutex poisoned");
        if guard.contains_key(&user.id.0) {
            return Err(StoreError::Conflict);
        }
        guard.insert(user.id.0.clone(), user);
        Ok(())
    }

    fn fetch(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        let guard = self.docs.lock().expect("user store mutex poisoned");
        Ok(guard.get(&id.0).cloned())
    }

    fn scan(&self) -> Result<Vec<UserRecord>, StoreError> {
        let guard = self.docs.lock().expect("user store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn add_participation(
        &self,
        id: &UserId,
        event: &EventId,
    ) -> Result<MembershipWrite, StoreError> {
        let mut guard = self.docs.lock().expect("user store mutex poisoned");
        let user = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if user.participates_in(event) {
            Ok(MembershipWrite::Unchanged)
        } else {
            user.event_participation.push(event.clone());
            Ok(MembershipWrite::Applied)
        }
    }

    fn remove_participation(
        &self,
        id: &UserId,
        event: &EventId,
    ) -> Result<MembershipWrite, StoreError> {
        let mut guard = self.docs.lock().expect("user store mutex poisoned");
        let user = guard.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        let before = user.event_participation.len();
        user.event_participation.retain(|existing| existing != event);
        if user.event_participation.len() == before {
            Ok(MembershipWrite::Unchanged)
        } else {
            Ok(MembershipWrite::Applied)
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryAttendees {
    docs: Arc<Mutex<Vec<AttendeeRecord>>>,
}

impl AttendeeStore for MemoryAttendees {
    fn insert(&self, attendee: AttendeeRecord) -> Result<(), StoreError> {
        let mut guard = self.docs.lock().expect("attendee store mutex poisoned");
        if guard.iter().any(|existing| existing.id == attendee.id) {
            return Err(StoreError::Conflict);
        }
        guard.push(attendee);
        Ok(())
    }

    fn find_by_event_and_phone(
        &self,
        event: &EventId,
        phone: &PhoneNumber,
    ) -> Result<Vec<AttendeeRecord>, StoreError> {
        let guard = self.docs.lock().expect("attendee store mutex poisoned");
        Ok(guard
            .iter()
            .filter(|existing| existing.event == *event && existing.phone == *phone)
            .cloned()
            .collect())
    }

    fn mark_checked_in(
        &self,
        id: &AttendeeId,
        concierge: &UserId,
        at: DateTime<Utc>,
    ) -> Result<CheckInWrite, StoreError> {
        let mut guard = self.docs.lock().expect("attendee store mutex poisoned");
        let attendee = guard
            .iter_mut()
            .find(|existing| existing.id == *id)
            .ok_or(StoreError::NotFound)?;
        if attendee.checked_in {
            return Ok(CheckInWrite::AlreadyCheckedIn(attendee.clone()));
        }
        attendee.checked_in = true;
        attendee.checked_in_by = Some(concierge.clone());
        attendee.checked_in_time = Some(at);
        Ok(CheckInWrite::Applied)
    }
}

impl MemoryAttendees {
    pub(super) fn record(&self, id: &str) -> Option<AttendeeRecord> {
        let guard = self.docs.lock().expect("attendee store mutex poisoned");
        guard.iter().find(|existing| existing.id.0 == id).cloned()
    }
}

/// User store whose participation writes fail a configured number of times
/// before recovering; permanent outage with `u32::MAX`.
pub(super) struct FlakyUsers {
    inner: MemoryUsers,
    failures_remaining: AtomicU32,
}

impl FlakyUsers {
    pub(super) fn failing(inner: MemoryUsers, failures: u32) -> Self {
        Self {
            inner,
            failures_remaining: AtomicU32::new(failures),
        }
    }

    fn trip(&self) -> Result<(), StoreError> {
        let tripped = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

impl UserStore for FlakyUsers {
    fn insert(&self, user: UserRecord) -> Result<(), StoreError> {
        self.inner.insert(user)
    }

    fn fetch(&self, id: &UserId) -> Result<Option<UserRecord>, StoreError> {
        self.inner.fetch(id)
    }

    fn scan(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.inner.scan()
    }

    fn add_participation(
        &self,
        id: &UserId,
        event: &EventId,
    ) -> Result<MembershipWrite, StoreError> {
        self.trip()?;
        self.inner.add_participation(id, event)
    }

    fn remove_participation(
        &self,
        id: &UserId,
        event: &EventId,
    ) -> Result<MembershipWrite, StoreError> {
        self.trip()?;
        self.inner.remove_participation(id, event)
    }
}
