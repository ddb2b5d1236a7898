use std::sync::Arc;

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json, Router};
use serde_json::json;

use amparo::workflows::aid::{
    announcement_router, application_router, benefit_router, document_router, AnnouncementManager,
    ApplicationManager, BenefitActivator, DocumentValidationTracker,
};

use crate::infra::{AppState, InMemoryAidStore, LoggingNotificationPublisher};

/// Every aid router merged with the operational endpoints, all wired to the
/// shared in-memory store.
pub(crate) fn with_aid_routes(
    store: Arc<InMemoryAidStore>,
    notifications: Arc<LoggingNotificationPublisher>,
) -> Router {
    let announcements = Arc::new(AnnouncementManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let applications = Arc::new(ApplicationManager::new(
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let documents = Arc::new(DocumentValidationTracker::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let benefits = Arc::new(BenefitActivator::new(
        store.clone(),
        store.clone(),
        store,
    ));

    announcement_router(announcements)
        .merge(application_router(applications, notifications))
        .merge(document_router(documents))
        .merge(benefit_router(benefits))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }
}
