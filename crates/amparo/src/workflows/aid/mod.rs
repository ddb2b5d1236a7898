//! Benefit-lifecycle orchestration for student financial-aid cycles.
//!
//! Announcements (editais) publish openings and evaluation stages; students
//! apply with supporting documents; staff validate documents and decide
//! applications; approved applications on closed announcements are
//! reconciled into active benefits. Storage, blob handling, and outbound
//! e-mail stay behind the ports in [`repository`], so every manager can be
//! exercised in isolation.

pub mod announcements;
pub mod applications;
pub mod benefits;
pub mod documents;
pub mod domain;
pub mod error;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

pub use announcements::{AnnouncementManager, AnnouncementPatch};
pub use applications::{ApplicationManager, ApplicationPatch};
pub use benefits::BenefitActivator;
pub use documents::DocumentValidationTracker;
pub use domain::{
    AnnouncementDraft, AnnouncementGraph, AnnouncementId, AnnouncementRecord, AnnouncementStatus,
    ApplicationId, ApplicationNode, ApplicationRecord, ApplicationStatus, BenefitId,
    BenefitRecord, BenefitStatus, BlobHandle, DocumentId, DocumentKind, DocumentRecord,
    DocumentStatus, ReviewerId, StageDraft, StageId, StageNode, StageRecord, StageResultId,
    StageResultRecord, StageResultStatus, StudentId, StudentRecord, ValidationDecision,
    ValidationId, ValidationRecord,
};
pub use error::AidServiceError;
pub use repository::{
    AnnouncementRepository, ApplicationRepository, BenefitRepository, BenefitView, BlobStore,
    BlobStoreError, DocumentRepository, NotificationError, NotificationPublisher,
    PendingDocuments, RepositoryError, RetractionOutcome, RetractionUnitOfWork,
    StatusChangeNotice, StudentDirectory,
};
pub use router::{announcement_router, application_router, benefit_router, document_router};
