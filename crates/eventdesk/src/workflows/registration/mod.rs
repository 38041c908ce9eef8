//! Event participation, concierge assignment, and attendee check-in.
//!
//! The three services in this module share one constraint: the entities they
//! coordinate live in separately-stored documents with no cross-document
//! transaction, so every invariant is enforced either inside a single atomic
//! document operation (concierge requests, check-in) or by an explicit
//! dual-write protocol with retry and reconciliation (marketer membership).

pub mod checkin;
pub mod concierge;
pub mod domain;
pub mod participation;
pub mod router;
pub mod store;

#[cfg(test)]
mod tests;

pub use checkin::{CheckInError, CheckInReceipt, CheckInService};
pub use concierge::{
    AssignmentError, AssignmentListing, AssignmentStatusView, ConciergeAssignmentService,
    ReviewDecision,
};
pub use domain::{
    Actor, AttendeeId, AttendeeRecord, ConciergeRequest, EventId, EventRecord, EventState,
    EventSummary, EventView, PhoneNumber, RequestId, RequestStatus, RequestView, UserId,
    UserRecord, UserRole, UserSummary,
};
pub use participation::{ParticipationCoordinator, ParticipationError, ReconcileReport};
pub use router::{registration_router, RegistrationServices};
pub use store::{
    AttendeeStore, CheckInWrite, EventStore, MembershipWrite, RequestAppend, RequestSettle,
    StoreError, UserStore,
};
