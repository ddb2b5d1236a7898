use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use super::announcements::{AnnouncementManager, AnnouncementPatch};
use super::applications::{ApplicationManager, ApplicationPatch};
use super::benefits::BenefitActivator;
use super::documents::DocumentValidationTracker;
use super::domain::{
    AnnouncementDraft, AnnouncementId, ApplicationId, BenefitId, BenefitStatus, BlobHandle,
    DocumentId, DocumentKind, ReviewerId, StageDraft, StageId, StageResultStatus, StudentId,
    ValidationDecision,
};
use super::error::AidServiceError;
use super::repository::{
    AnnouncementRepository, ApplicationRepository, BenefitRepository, DocumentRepository,
    NotificationPublisher, StatusChangeNotice, StudentDirectory,
};

impl IntoResponse for AidServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            AidServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            AidServiceError::InvalidState(_) => StatusCode::CONFLICT,
            AidServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AidServiceError::TransactionFailure(source) => {
                error!(cause = %source, "unit of work rolled back");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AidServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Router builder for announcement lifecycle, stages, and retraction.
pub fn announcement_router<E, A, B>(manager: Arc<AnnouncementManager<E, A, B>>) -> Router
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/aid/announcements",
            post(create_announcement_handler::<E, A, B>),
        )
        .route(
            "/api/v1/aid/announcements/:announcement_id",
            get(get_announcement_handler::<E, A, B>)
                .patch(update_announcement_handler::<E, A, B>)
                .delete(retract_announcement_handler::<E, A, B>),
        )
        .route(
            "/api/v1/aid/announcements/:announcement_id/stages",
            post(append_stage_handler::<E, A, B>),
        )
        .route(
            "/api/v1/aid/stages/:stage_id",
            delete(remove_stage_handler::<E, A, B>),
        )
        .route(
            "/api/v1/aid/stage-results",
            post(record_stage_result_handler::<E, A, B>),
        )
        .with_state(manager)
}

async fn create_announcement_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Json(draft): Json<AnnouncementDraft>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.create_announcement(draft) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn get_announcement_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Path(announcement_id): Path<String>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.get(&AnnouncementId(announcement_id)) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn update_announcement_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Path(announcement_id): Path<String>,
    Json(patch): Json<AnnouncementPatch>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.update_announcement(&AnnouncementId(announcement_id), patch) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn retract_announcement_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Path(announcement_id): Path<String>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.retract_announcement(&AnnouncementId(announcement_id)) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn append_stage_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Path(announcement_id): Path<String>,
    Json(draft): Json<StageDraft>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.append_stage(&AnnouncementId(announcement_id), draft) {
        Ok(stage) => (StatusCode::CREATED, Json(stage)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn remove_stage_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Path(stage_id): Path<String>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.remove_stage(&StageId(stage_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct StageResultBody {
    application_id: ApplicationId,
    stage_id: StageId,
    status: StageResultStatus,
    #[serde(default)]
    observation: String,
    #[serde(default)]
    evaluated_on: Option<NaiveDate>,
}

async fn record_stage_result_handler<E, A, B>(
    State(manager): State<Arc<AnnouncementManager<E, A, B>>>,
    Json(body): Json<StageResultBody>,
) -> Response
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    match manager.record_stage_result(
        &body.application_id,
        &body.stage_id,
        body.status,
        body.observation,
        body.evaluated_on,
    ) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Router builder for application intake, updates, and projections. The
/// notification publisher is invoked here, after a successful status change;
/// the manager itself never talks to the e-mail collaborator.
pub fn application_router<A, E, D, S, N>(
    manager: Arc<ApplicationManager<A, E, D, S>>,
    notifications: Arc<N>,
) -> Router
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/aid/applications",
            post(create_application_handler::<A, E, D, S, N>),
        )
        .route(
            "/api/v1/aid/applications/:application_id",
            get(get_application_handler::<A, E, D, S, N>)
                .patch(update_application_handler::<A, E, D, S, N>),
        )
        .route(
            "/api/v1/aid/students/:student_id/pending-documents",
            get(pending_documents_handler::<A, E, D, S, N>),
        )
        .with_state((manager, notifications))
}

#[derive(Debug, Deserialize)]
struct CreateApplicationBody {
    student_id: StudentId,
    announcement_id: AnnouncementId,
    #[serde(default)]
    document_ids: Vec<DocumentId>,
    #[serde(default)]
    submitted_on: Option<NaiveDate>,
}

async fn create_application_handler<A, E, D, S, N>(
    State((manager, _)): State<(Arc<ApplicationManager<A, E, D, S>>, Arc<N>)>,
    Json(body): Json<CreateApplicationBody>,
) -> Response
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let submitted_on = body
        .submitted_on
        .unwrap_or_else(|| Local::now().date_naive());
    match manager.create_application(
        &body.student_id,
        &body.announcement_id,
        &body.document_ids,
        submitted_on,
    ) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn get_application_handler<A, E, D, S, N>(
    State((manager, _)): State<(Arc<ApplicationManager<A, E, D, S>>, Arc<N>)>,
    Path(application_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    match manager.get(&ApplicationId(application_id)) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn update_application_handler<A, E, D, S, N>(
    State((manager, notifications)): State<(Arc<ApplicationManager<A, E, D, S>>, Arc<N>)>,
    Path(application_id): Path<String>,
    Json(patch): Json<ApplicationPatch>,
) -> Response
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    let status_changed = patch.status.is_some();
    match manager.update_application(&id, patch) {
        Ok(record) => {
            if status_changed {
                let notice = StatusChangeNotice {
                    application_id: record.id.clone(),
                    student_id: record.student_id.clone(),
                    status: record.status,
                };
                if let Err(cause) = notifications.publish(notice) {
                    warn!(application = %record.id.0, %cause, "status notification failed");
                }
            }
            Json(record).into_response()
        }
        Err(error) => error.into_response(),
    }
}

async fn pending_documents_handler<A, E, D, S, N>(
    State((manager, _)): State<(Arc<ApplicationManager<A, E, D, S>>, Arc<N>)>,
    Path(student_id): Path<String>,
) -> Response
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
    N: NotificationPublisher + 'static,
{
    match manager.list_pending_documents(&StudentId(student_id)) {
        Ok(views) => Json(views).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Router builder for document submission and validation.
pub fn document_router<D, A, E>(tracker: Arc<DocumentValidationTracker<D, A, E>>) -> Router
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/aid/documents",
            post(submit_document_handler::<D, A, E>),
        )
        .route(
            "/api/v1/aid/documents/:document_id/validations",
            get(validation_history_handler::<D, A, E>)
                .post(record_validation_handler::<D, A, E>),
        )
        .route(
            "/api/v1/aid/students/:student_id/rejected-documents",
            get(has_any_rejected_handler::<D, A, E>),
        )
        .with_state(tracker)
}

#[derive(Debug, Deserialize)]
struct SubmitDocumentBody {
    application_id: ApplicationId,
    kind: DocumentKind,
    blob_handle: BlobHandle,
}

async fn submit_document_handler<D, A, E>(
    State(tracker): State<Arc<DocumentValidationTracker<D, A, E>>>,
    Json(body): Json<SubmitDocumentBody>,
) -> Response
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    match tracker.submit_document(&body.application_id, body.kind, body.blob_handle) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RecordValidationBody {
    decision: ValidationDecision,
    reviewer_id: ReviewerId,
    #[serde(default)]
    opinion: String,
    #[serde(default)]
    decided_on: Option<NaiveDate>,
}

async fn record_validation_handler<D, A, E>(
    State(tracker): State<Arc<DocumentValidationTracker<D, A, E>>>,
    Path(document_id): Path<String>,
    Json(body): Json<RecordValidationBody>,
) -> Response
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    let decided_on = body.decided_on.unwrap_or_else(|| Local::now().date_naive());
    match tracker.record_validation(
        &DocumentId(document_id),
        body.decision,
        body.reviewer_id,
        body.opinion,
        decided_on,
    ) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn validation_history_handler<D, A, E>(
    State(tracker): State<Arc<DocumentValidationTracker<D, A, E>>>,
    Path(document_id): Path<String>,
) -> Response
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    match tracker.validation_history(&DocumentId(document_id)) {
        Ok(history) => Json(history).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn has_any_rejected_handler<D, A, E>(
    State(tracker): State<Arc<DocumentValidationTracker<D, A, E>>>,
    Path(student_id): Path<String>,
) -> Response
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    match tracker.has_any_rejected(&StudentId(student_id)) {
        Ok(rejected) => Json(json!({ "has_any_rejected": rejected })).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Router builder for benefit reconciliation and projections.
pub fn benefit_router<B, A, E>(activator: Arc<BenefitActivator<B, A, E>>) -> Router
where
    B: BenefitRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/aid/announcements/:announcement_id/reconcile",
            post(reconcile_handler::<B, A, E>),
        )
        .route(
            "/api/v1/aid/students/:student_id/benefits",
            get(student_benefits_handler::<B, A, E>),
        )
        .route(
            "/api/v1/aid/benefits/:benefit_id/status",
            post(benefit_status_handler::<B, A, E>),
        )
        .with_state(activator)
}

#[derive(Debug, Default, Deserialize)]
struct ReconcileBody {
    #[serde(default)]
    on: Option<NaiveDate>,
}

async fn reconcile_handler<B, A, E>(
    State(activator): State<Arc<BenefitActivator<B, A, E>>>,
    Path(announcement_id): Path<String>,
    body: Option<Json<ReconcileBody>>,
) -> Response
where
    B: BenefitRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    let on = body
        .and_then(|Json(body)| body.on)
        .unwrap_or_else(|| Local::now().date_naive());
    match activator.reconcile(&AnnouncementId(announcement_id), on) {
        Ok(created) => Json(created).into_response(),
        Err(error) => error.into_response(),
    }
}

async fn student_benefits_handler<B, A, E>(
    State(activator): State<Arc<BenefitActivator<B, A, E>>>,
    Path(student_id): Path<String>,
) -> Response
where
    B: BenefitRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    match activator.list_active_benefits(&StudentId(student_id)) {
        Ok(views) => Json(views).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct BenefitStatusBody {
    status: BenefitStatus,
}

async fn benefit_status_handler<B, A, E>(
    State(activator): State<Arc<BenefitActivator<B, A, E>>>,
    Path(benefit_id): Path<String>,
    Json(body): Json<BenefitStatusBody>,
) -> Response
where
    B: BenefitRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    match activator.set_status(&BenefitId(benefit_id), body.status) {
        Ok(record) => Json(record).into_response(),
        Err(error) => error.into_response(),
    }
}
