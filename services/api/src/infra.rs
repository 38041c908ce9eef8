use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use eventdesk::workflows::registration::{
    AttendeeId, AttendeeRecord, AttendeeStore, CheckInWrite, ConciergeRequest, EventId,
    EventRecord, EventState, EventStore, MembershipWrite, PhoneNumber, RequestAppend, RequestId,
    RequestSettle, RequestStatus, StoreError, UserId, UserRecord, UserRole, UserStore,
};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Document-store stand-in for the Event aggregate. Each mutating method
/// holds the collection lock for the whole precondition-plus-write, which
/// is the adapter's atomic-document-operation contract.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEventStore {
    docs: Arc<Mutex<BTreeMap<String, EventRecord>>>,
}

impl EventStore for InMemoryEventStore {
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

/// Document-store stand-in for the User aggregate.
#[derive(Default, Clone)]
pub(crate) struct InMemoryUserStore {
    docs: Arc<Mutex<BTreeMap<String, UserRecord>>>,
}

impl UserStore for InMemoryUserStore {
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

/// Document-store stand-in for attendee registrations; kept in insertion
/// order so "first match" is well defined for duplicate registrations.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAttendeeStore {
    docs: Arc<Mutex<Vec<AttendeeRecord>>>,
}

impl AttendeeStore for InMemoryAttendeeStore {
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

pub(crate) const DEMO_EVENT: &str = "riverfront-expo";
pub(crate) const DEMO_MARKETER: &str = "mara-velez";
pub(crate) const DEMO_CONCIERGE: &str = "cole-tran";
pub(crate) const DEMO_ADMIN: &str = "ada-okafor";
pub(crate) const DEMO_PHONE: &str = "+15551234567";

/// Stand-in for the external creation flows: one published event, the three
/// staff roles, and two registered attendees.
pub(crate) fn seed_demo_data(
    events: &InMemoryEventStore,
    users: &InMemoryUserStore,
    attendees: &InMemoryAttendeeStore,
) -> Result<(), StoreError> {
    events.insert(EventRecord {
        id: EventId(DEMO_EVENT.to_string()),
        name: "Riverfront Product Expo".to_string(),
        venue: "Riverside Hall, Des Moines".to_string(),
        starts_at: Utc::now() + Duration::days(14),
        capacity: 350,
        state: EventState::Published,
        marketers: Vec::new(),
        concierge_requests: Vec::new(),
    })?;

    users.insert(UserRecord {
        id: UserId(DEMO_MARKETER.to_string()),
        name: "Mara Velez".to_string(),
        role: UserRole::Marketer,
        event_participation: Vec::new(),
    })?;
    users.insert(UserRecord {
        id: UserId(DEMO_CONCIERGE.to_string()),
        name: "Cole Tran".to_string(),
        role: UserRole::Concierge,
        event_participation: Vec::new(),
    })?;
    users.insert(UserRecord {
        id: UserId(DEMO_ADMIN.to_string()),
        name: "Ada Okafor".to_string(),
        role: UserRole::Admin,
        event_participation: Vec::new(),
    })?;

    attendees.insert(AttendeeRecord {
        id: AttendeeId("att-0001".to_string()),
        event: EventId(DEMO_EVENT.to_string()),
        phone: PhoneNumber(DEMO_PHONE.to_string()),
        name: "Trish Nguyen".to_string(),
        checked_in: false,
        checked_in_by: None,
        checked_in_time: None,
    })?;
    attendees.insert(AttendeeRecord {
        id: AttendeeId("att-0002".to_string()),
        event: EventId(DEMO_EVENT.to_string()),
        phone: PhoneNumber("+15559876543".to_string()),
        name: "Jordan Blake".to_string(),
        checked_in: false,
        checked_in_by: None,
        checked_in_time: None,
    })?;

    Ok(())
}
