use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::checkin::{CheckInError, CheckInService};
use super::concierge::{AssignmentError, ConciergeAssignmentService, ReviewDecision};
use super::domain::{Actor, EventId, PhoneNumber, RequestId, UserId, UserRole};
use super::participation::{ParticipationCoordinator, ParticipationError};
use super::store::{AttendeeStore, EventStore, StoreError, UserStore};

/// The three engine services wired over one set of store adapters; router
/// state for the registration operation surface.
pub struct RegistrationServices<E, U, A> {
    pub participation: ParticipationCoordinator<E, U>,
    pub assignments: ConciergeAssignmentService<E, U>,
    pub checkin: CheckInService<E, A>,
}

impl<E, U, A> RegistrationServices<E, U, A>
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    pub fn new(events: Arc<E>, users: Arc<U>, attendees: Arc<A>, backref_retries: u32) -> Self {
        Self {
            participation: ParticipationCoordinator::with_retry_limit(
                events.clone(),
                users.clone(),
                backref_retries,
            ),
            assignments: ConciergeAssignmentService::new(events.clone(), users),
            checkin: CheckInService::new(events, attendees),
        }
    }
}

/// Router builder exposing the participation, assignment, and check-in
/// operations. Authentication happens upstream; the gateway forwards the
/// caller identity in `x-actor-id` / `x-actor-role` headers.
pub fn registration_router<E, U, A>(services: Arc<RegistrationServices<E, U, A>>) -> Router
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/events/:event_id/marketers/:user_id",
            post(join_handler::<E, U, A>).delete(leave_handler::<E, U, A>),
        )
        .route(
            "/api/v1/events/:event_id/concierge-requests",
            post(request_handler::<E, U, A>),
        )
        .route(
            "/api/v1/events/:event_id/concierge-requests/:request_id/review",
            post(review_handler::<E, U, A>),
        )
        .route(
            "/api/v1/events/:event_id/concierge-requests/user/:user_id",
            delete(cancel_handler::<E, U, A>).get(my_status_handler::<E, U, A>),
        )
        .route(
            "/api/v1/concierge-requests/pending",
            get(list_pending_handler::<E, U, A>),
        )
        .route(
            "/api/v1/concierge-requests/approved",
            get(list_approved_handler::<E, U, A>),
        )
        .route(
            "/api/v1/events/:event_id/check-ins",
            post(check_in_handler::<E, U, A>),
        )
        .with_state(services)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewBody {
    pub(crate) approve: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckInBody {
    pub(crate) phone: String,
}

/// Caller identity forwarded by the gateway. Absent or malformed headers are
/// rejected before any engine call.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let user_id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let role = headers
        .get("x-actor-role")
        .and_then(|value| value.to_str().ok())
        .and_then(UserRole::parse);

    match (user_id, role) {
        (Some(id), Some(role)) => Ok(Actor {
            user_id: UserId(id.to_string()),
            role,
        }),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": "missing or invalid actor identity headers" })),
        )
            .into_response()),
    }
}

pub(crate) async fn join_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path((event_id, user_id)): Path<(String, String)>,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    match services
        .participation
        .join(&EventId(event_id), &UserId(user_id))
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => participation_error_response(err),
    }
}

pub(crate) async fn leave_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path((event_id, user_id)): Path<(String, String)>,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    match services
        .participation
        .leave(&EventId(event_id), &UserId(user_id))
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => participation_error_response(err),
    }
}

pub(crate) async fn request_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match services
        .assignments
        .request(&EventId(event_id), &actor.user_id)
    {
        Ok(view) => (StatusCode::CREATED, axum::Json(view)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn review_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path((event_id, request_id)): Path<(String, String)>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let decision = if body.approve {
        ReviewDecision::Approve
    } else {
        ReviewDecision::Reject
    };

    match services.assignments.review(
        &EventId(event_id),
        &RequestId(request_id),
        decision,
        &actor.user_id,
    ) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn cancel_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path((event_id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match services
        .assignments
        .cancel(&EventId(event_id), &UserId(user_id), &actor)
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn my_status_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path((event_id, user_id)): Path<(String, String)>,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    match services
        .assignments
        .my_status(&EventId(event_id), &UserId(user_id))
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn list_pending_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    headers: HeaderMap,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    match require_admin(&headers) {
        Ok(()) => {}
        Err(response) => return response,
    }
    match services.assignments.list_pending() {
        Ok(listings) => (StatusCode::OK, axum::Json(listings)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn list_approved_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    headers: HeaderMap,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    match require_admin(&headers) {
        Ok(()) => {}
        Err(response) => return response,
    }
    match services.assignments.list_approved() {
        Ok(listings) => (StatusCode::OK, axum::Json(listings)).into_response(),
        Err(err) => assignment_error_response(err),
    }
}

pub(crate) async fn check_in_handler<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<CheckInBody>,
) -> Response
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match services.checkin.check_in(
        &EventId(event_id),
        &PhoneNumber(body.phone),
        &actor.user_id,
    ) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(err) => checkin_error_response(err),
    }
}

fn require_admin(headers: &HeaderMap) -> Result<(), Response> {
    let actor = actor_from_headers(headers)?;
    if actor.role != UserRole::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            axum::Json(json!({ "error": "listing assignment requests requires the admin role" })),
        )
            .into_response());
    }
    Ok(())
}

fn participation_error_response(err: ParticipationError) -> Response {
    if let ParticipationError::PartialFailure { event, user, .. } = &err {
        // Surfaced distinctly so operators can target the reconcile pass.
        let payload = json!({
            "error": err.to_string(),
            "divergence": { "event": event.0, "user": user.0 },
        });
        return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response();
    }

    let status = match &err {
        ParticipationError::EventNotFound(_) | ParticipationError::UserNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        ParticipationError::NotAMarketer { .. } => StatusCode::FORBIDDEN,
        ParticipationError::PartialFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        ParticipationError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    (status, axum::Json(json!({ "error": err.to_string() }))).into_response()
}

fn assignment_error_response(err: AssignmentError) -> Response {
    let status = match &err {
        AssignmentError::EventNotFound(_)
        | AssignmentError::UserNotFound(_)
        | AssignmentError::RequestNotFound { .. }
        | AssignmentError::NoPendingRequest { .. } => StatusCode::NOT_FOUND,
        AssignmentError::NotAConcierge { .. }
        | AssignmentError::ReviewerNotAdmin { .. }
        | AssignmentError::CancelNotOwner { .. } => StatusCode::FORBIDDEN,
        AssignmentError::DuplicatePending { .. } | AssignmentError::AlreadySettled { .. } => {
            StatusCode::CONFLICT
        }
        AssignmentError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    (status, axum::Json(json!({ "error": err.to_string() }))).into_response()
}

fn checkin_error_response(err: CheckInError) -> Response {
    let status = match &err {
        CheckInError::EventNotFound(_) | CheckInError::AttendeeNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        CheckInError::NotApproved { .. } => StatusCode::FORBIDDEN,
        CheckInError::AlreadyCheckedIn { .. } => StatusCode::CONFLICT,
        CheckInError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        CheckInError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    (status, axum::Json(json!({ "error": err.to_string() }))).into_response()
}
