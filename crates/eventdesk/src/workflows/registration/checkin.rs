use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::domain::{AttendeeId, EventId, PhoneNumber, UserId};
use super::store::{AttendeeStore, CheckInWrite, EventStore, StoreError};

/// Attendee check-in, gated on the event's approved concierge set.
///
/// The false-to-true flip of the check-in flag happens inside the store's
/// conditional write, so concurrent attempts for the same attendee resolve
/// to exactly one success.
pub struct CheckInService<E, A> {
    events: Arc<E>,
    attendees: Arc<A>,
}

impl<E, A> CheckInService<E, A>
where
    E: EventStore + 'static,
    A: AttendeeStore + 'static,
{
    pub fn new(events: Arc<E>, attendees: Arc<A>) -> Self {
        Self { events, attendees }
    }

    pub fn check_in(
        &self,
        event_id: &EventId,
        phone: &PhoneNumber,
        concierge: &UserId,
    ) -> Result<CheckInReceipt, CheckInError> {
        let event = self
            .events
            .fetch(event_id)?
            .ok_or_else(|| CheckInError::EventNotFound(event_id.clone()))?;
        if !event.approved_concierge(concierge) {
            return Err(CheckInError::NotApproved {
                event: event_id.clone(),
                user: concierge.clone(),
            });
        }

        let matches = self.attendees.find_by_event_and_phone(event_id, phone)?;
        let attendee = match matches.first() {
            None => {
                return Err(CheckInError::AttendeeNotFound {
                    event: event_id.clone(),
                    phone: phone.clone(),
                })
            }
            Some(first) => {
                if matches.len() > 1 {
                    warn!(
                        event = %event_id,
                        phone = %phone,
                        matches = matches.len(),
                        "multiple attendee records share this phone; using the first"
                    );
                }
                first.clone()
            }
        };

        let now = Utc::now();
        match self.attendees.mark_checked_in(&attendee.id, concierge, now) {
            Ok(CheckInWrite::Applied) => Ok(CheckInReceipt {
                attendee: attendee.id,
                event: event_id.clone(),
                phone: attendee.phone,
                checked_in_by: concierge.clone(),
                checked_in_time: now,
            }),
            Ok(CheckInWrite::AlreadyCheckedIn(existing)) => Err(CheckInError::AlreadyCheckedIn {
                phone: existing.phone,
                checked_in_by: existing.checked_in_by,
                checked_in_time: existing.checked_in_time,
            }),
            // The record disappeared between lookup and write.
            Err(StoreError::NotFound) => Err(CheckInError::AttendeeNotFound {
                event: event_id.clone(),
                phone: phone.clone(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

/// Acknowledgement returned on a successful check-in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInReceipt {
    pub attendee: AttendeeId,
    pub event: EventId,
    pub phone: PhoneNumber,
    pub checked_in_by: UserId,
    pub checked_in_time: DateTime<Utc>,
}

/// Error raised by the check-in workflow.
#[derive(Debug, thiserror::Error)]
pub enum CheckInError {
    #[error("event {0} not found")]
    EventNotFound(EventId),
    #[error("user {user} is not an approved concierge for event {event}")]
    NotApproved { event: EventId, user: UserId },
    #[error("no attendee registered with phone {phone} for event {event}")]
    AttendeeNotFound { event: EventId, phone: PhoneNumber },
    #[error("attendee with phone {phone} is already checked in")]
    AlreadyCheckedIn {
        phone: PhoneNumber,
        checked_in_by: Option<UserId>,
        checked_in_time: Option<DateTime<Utc>>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}
