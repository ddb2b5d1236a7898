use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use tracing::info;

use amparo::config::AppConfig;
use amparo::error::AppError;
use amparo::telemetry;

use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryAidStore, LoggingNotificationPublisher};
use crate::routes::with_aid_routes;

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

    let store = Arc::new(InMemoryAidStore::default());
    seed_roster(&store);
    let notifications = Arc::new(LoggingNotificationPublisher);

    let app = with_aid_routes(store, notifications)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "aid benefit engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}

// The student roster is owned by the academic registry upstream; until that
// integration lands, the in-memory deployment ships with a fixed roster.
fn seed_roster(store: &InMemoryAidStore) {
    store.seed_student("stu-000001", "Ana Beatriz Lima", "20260001");
    store.seed_student("stu-000002", "Carlos Eduardo Souza", "20260002");
    store.seed_student("stu-000003", "Mariana Alves Pereira", "20260003");
}
