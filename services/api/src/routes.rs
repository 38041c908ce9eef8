use crate::infra::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use axum::Json;
use eventdesk::workflows::registration::router::actor_from_headers;
use eventdesk::workflows::registration::{
    registration_router, AttendeeStore, EventStore, RegistrationServices, UserRole, UserStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_registration_routes<E, U, A>(
    services: Arc<RegistrationServices<E, U, A>>,
) -> axum::Router
where
    E: EventStore + 'static,
    U: UserStore + 'static,
    A: AttendeeStore + 'static,
{
    let admin = axum::Router::new()
        .route(
            "/api/v1/participation/reconcile",
            axum::routing::post(reconcile_endpoint::<E, U, A>),
        )
        .with_state(services.clone());

    registration_router(services)
        .merge(admin)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Operator-triggered repair pass for the marketer membership invariant.
pub(crate) async fn reconcile_endpoint<E, U, A>(
    State(services): State<Arc<RegistrationServices<E, U, A>>>,
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
    if actor.role != UserRole::Admin {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "reconciliation requires the admin role" })),
        )
            .into_response();
    }

    match services.participation.reconcile() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
