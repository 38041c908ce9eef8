use crate::cli::ServeArgs;
use crate::infra::{seed_demo_data, AppState, InMemoryAttendeeStore, InMemoryEventStore, InMemoryUserStore};
use crate::routes::with_registration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use eventdesk::config::AppConfig;
use eventdesk::error::AppError;
use eventdesk::telemetry;
use eventdesk::workflows::registration::RegistrationServices;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let events = Arc::new(InMemoryEventStore::default());
    let users = Arc::new(InMemoryUserStore::default());
    let attendees = Arc::new(InMemoryAttendeeStore::default());
    if args.seed_demo {
        seed_demo_data(&events, &users, &attendees)?;
        info!("seeded demo fixtures into the in-memory stores");
    }

    let services = Arc::new(RegistrationServices::new(
        events,
        users,
        attendees,
        config.participation.backref_retries,
    ));

    let app = with_registration_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "event registration desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
