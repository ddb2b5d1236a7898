use serde::Serialize;

use super::domain::{
    AnnouncementGraph, AnnouncementId, AnnouncementRecord, ApplicationId, ApplicationRecord,
    ApplicationStatus, BenefitId, BenefitRecord, BenefitStatus, BlobHandle, DocumentId,
    DocumentRecord, DocumentStatus, StageId, StageRecord, StageResultRecord, StudentId,
    StudentRecord, ValidationRecord,
};
use chrono::NaiveDate;

/// Error enumeration for storage-port failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("referential integrity violation: {0}")]
    ForeignKey(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Read-only view over the student roster. Students are owned elsewhere;
/// the engine only resolves references.
pub trait StudentDirectory: Send + Sync {
    fn fetch(&self, id: &StudentId) -> Result<Option<StudentRecord>, RepositoryError>;
}

/// Storage port for announcements, stages, and stage results. These three
/// entities are mutated exclusively through the announcement manager.
pub trait AnnouncementRepository: Send + Sync {
    fn insert_graph(
        &self,
        announcement: AnnouncementRecord,
        stages: Vec<StageRecord>,
    ) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &AnnouncementId) -> Result<Option<AnnouncementRecord>, RepositoryError>;
    /// Load the announcement together with its stages, each stage's results,
    /// and every dependent application with its documents, in one read.
    fn fetch_graph(&self, id: &AnnouncementId)
        -> Result<Option<AnnouncementGraph>, RepositoryError>;
    fn update(&self, record: AnnouncementRecord) -> Result<(), RepositoryError>;
    fn insert_stage(&self, stage: StageRecord) -> Result<(), RepositoryError>;
    fn fetch_stage(&self, id: &StageId) -> Result<Option<StageRecord>, RepositoryError>;
    fn stages(&self, announcement_id: &AnnouncementId)
        -> Result<Vec<StageRecord>, RepositoryError>;
    fn stage_results(&self, stage_id: &StageId)
        -> Result<Vec<StageResultRecord>, RepositoryError>;
    fn upsert_stage_result(&self, result: StageResultRecord) -> Result<(), RepositoryError>;
    /// Run the supplied unit of work atomically. Either every delete issued
    /// inside the closure becomes visible, or none does. A closure error
    /// rolls the whole unit back and is returned unchanged.
    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn RetractionUnitOfWork) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError>;
}

/// Delete operations available inside one atomic unit of work. The storage
/// layer enforces referential integrity in the child-before-parent direction;
/// out-of-order deletes fail with `RepositoryError::ForeignKey`.
pub trait RetractionUnitOfWork {
    fn delete_stage_results(&mut self, stage_id: &StageId) -> Result<usize, RepositoryError>;
    fn delete_validations(&mut self, application_id: &ApplicationId)
        -> Result<usize, RepositoryError>;
    fn delete_documents(&mut self, application_id: &ApplicationId)
        -> Result<usize, RepositoryError>;
    fn delete_application(&mut self, application_id: &ApplicationId)
        -> Result<(), RepositoryError>;
    fn delete_stage(&mut self, stage_id: &StageId) -> Result<(), RepositoryError>;
    fn delete_stages(&mut self, announcement_id: &AnnouncementId)
        -> Result<usize, RepositoryError>;
    fn delete_announcement(&mut self, announcement_id: &AnnouncementId)
        -> Result<(), RepositoryError>;
}

/// Storage port for applications.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn by_student(&self, id: &StudentId) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn by_announcement(
        &self,
        id: &AnnouncementId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

/// Storage port for documents and their append-only validation history.
pub trait DocumentRepository: Send + Sync {
    fn insert(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError>;
    fn fetch(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<(), RepositoryError>;
    /// Re-point a document at another application (creation-time attachment).
    fn attach(
        &self,
        id: &DocumentId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError>;
    /// Row order is unspecified. Ids are issued as a zero-padded sequence,
    /// so callers derive chronology from the id, never from row position.
    fn by_application(&self, id: &ApplicationId)
        -> Result<Vec<DocumentRecord>, RepositoryError>;
    /// Insert-only: validation records are never updated or deleted here.
    fn append_validation(&self, record: ValidationRecord) -> Result<(), RepositoryError>;
    /// Row order is unspecified, same as `by_application`.
    fn validations(&self, id: &DocumentId) -> Result<Vec<ValidationRecord>, RepositoryError>;
}

/// Storage port for benefits. `insert_unique` enforces one benefit per
/// application at the storage layer, closing the concurrent-reconcile race.
pub trait BenefitRepository: Send + Sync {
    fn insert_unique(&self, record: BenefitRecord) -> Result<BenefitRecord, RepositoryError>;
    fn fetch(&self, id: &BenefitId) -> Result<Option<BenefitRecord>, RepositoryError>;
    fn by_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<BenefitRecord>, RepositoryError>;
    fn update(&self, record: BenefitRecord) -> Result<(), RepositoryError>;
}

/// Error raised by the blob store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("blob not found")]
    NotFound,
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Opaque put/get blob storage for document binaries. The engine stores
/// handles only and never interprets contents.
pub trait BlobStore: Send + Sync {
    fn put(&self, bytes: Vec<u8>) -> Result<BlobHandle, BlobStoreError>;
    fn get(&self, handle: &BlobHandle) -> Result<Vec<u8>, BlobStoreError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Payload handed to the outbound e-mail collaborator when an application's
/// status changes. The managers never publish this themselves; the HTTP
/// layer does, after a successful status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChangeNotice {
    pub application_id: ApplicationId,
    pub student_id: StudentId,
    pub status: ApplicationStatus,
}

/// Trait describing the outbound e-mail hook.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notice: StatusChangeNotice) -> Result<(), NotificationError>;
}

/// Projection of one application's documents still awaiting review.
#[derive(Debug, Clone, Serialize)]
pub struct PendingDocuments {
    pub application_id: ApplicationId,
    pub announcement_id: AnnouncementId,
    pub documents: Vec<DocumentRecord>,
}

/// Projection of one active benefit with its announcement's descriptive
/// metadata, as listed per student.
#[derive(Debug, Clone, Serialize)]
pub struct BenefitView {
    pub benefit_id: BenefitId,
    pub application_id: ApplicationId,
    pub status: BenefitStatus,
    pub starts_on: NaiveDate,
    pub announcement_title: String,
    pub category_tags: Vec<String>,
}

/// Result of a retraction call. Deleting an absent announcement is a
/// successful no-op at this layer; the caller decides whether to surface it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RetractionOutcome {
    Retracted {
        stages: usize,
        stage_results: usize,
        applications: usize,
        documents: usize,
    },
    AlreadyAbsent,
}
