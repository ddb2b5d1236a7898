use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::domain::{
    ApplicationId, ApplicationStatus, BlobHandle, DocumentId, DocumentKind, DocumentRecord,
    DocumentStatus, ReviewerId, StudentId, ValidationDecision, ValidationId, ValidationRecord,
};
use super::error::AidServiceError;
use super::repository::{AnnouncementRepository, ApplicationRepository, DocumentRepository};

static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static VALIDATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_document_id() -> DocumentId {
    let id = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DocumentId(format!("doc-{id:06}"))
}

fn next_validation_id() -> ValidationId {
    let id = VALIDATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ValidationId(format!("val-{id:06}"))
}

/// Owns per-document status and the append-only validation history.
pub struct DocumentValidationTracker<D, A, E> {
    documents: Arc<D>,
    applications: Arc<A>,
    announcements: Arc<E>,
}

impl<D, A, E> DocumentValidationTracker<D, A, E>
where
    D: DocumentRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    pub fn new(documents: Arc<D>, applications: Arc<A>, announcements: Arc<E>) -> Self {
        Self {
            documents,
            applications,
            announcements,
        }
    }

    /// Attach a document to a pending application, or start a new validation
    /// round for a kind whose latest document was rejected.
    pub fn submit_document(
        &self,
        application_id: &ApplicationId,
        kind: DocumentKind,
        blob_handle: BlobHandle,
    ) -> Result<DocumentRecord, AidServiceError> {
        let application = self
            .applications
            .fetch(application_id)?
            .ok_or_else(|| AidServiceError::not_found("application", &application_id.0))?;

        if application.status != ApplicationStatus::Pending {
            return Err(AidServiceError::InvalidState(format!(
                "application {} is {}, documents are only accepted while PENDENTE",
                application_id.0,
                application.status.label()
            )));
        }

        let announcement = self
            .announcements
            .fetch(&application.announcement_id)?
            .ok_or_else(|| {
                AidServiceError::not_found("announcement", &application.announcement_id.0)
            })?;

        if !announcement.required_documents.contains(&kind) {
            return Err(AidServiceError::Validation(format!(
                "document kind {} is not required by announcement {}",
                kind.0, announcement.id.0
            )));
        }

        // The latest document of a kind gates resubmission: anything other
        // than REPROVADO means the current round is still live. Ids are a
        // zero-padded sequence, so the maximum id is the latest submission
        // regardless of the row order the port picked.
        let latest_of_kind = self
            .documents
            .by_application(application_id)?
            .into_iter()
            .filter(|document| document.kind == kind)
            .max_by(|a, b| a.id.0.cmp(&b.id.0));
        if let Some(current) = latest_of_kind {
            if current.status != DocumentStatus::Rejected {
                return Err(AidServiceError::InvalidState(format!(
                    "document kind {} already has a {} submission",
                    kind.0,
                    current.status.label()
                )));
            }
        }

        let record = DocumentRecord {
            id: next_document_id(),
            application_id: application_id.clone(),
            kind,
            blob_handle,
            status: DocumentStatus::Pending,
        };
        let stored = self.documents.insert(record)?;
        info!(document = %stored.id.0, application = %application_id.0, "document submitted");
        Ok(stored)
    }

    /// Append a reviewer decision and move the document to the decided
    /// status. Decisions accumulate; nothing is overwritten.
    pub fn record_validation(
        &self,
        document_id: &DocumentId,
        decision: ValidationDecision,
        reviewer_id: ReviewerId,
        opinion: String,
        decided_on: NaiveDate,
    ) -> Result<DocumentRecord, AidServiceError> {
        let mut document = self
            .documents
            .fetch(document_id)?
            .ok_or_else(|| AidServiceError::not_found("document", &document_id.0))?;

        // Status is monotone within a round: a decided document cannot drop
        // back to EM_ANALISE. Corrections between APROVADO and REPROVADO
        // append a fresh record instead.
        if document.status.is_decided() && decision == ValidationDecision::UnderReview {
            return Err(AidServiceError::InvalidState(format!(
                "document {} is already {}, cannot return to EM_ANALISE",
                document_id.0,
                document.status.label()
            )));
        }

        self.documents.append_validation(ValidationRecord {
            id: next_validation_id(),
            document_id: document_id.clone(),
            reviewer_id,
            decision,
            opinion,
            decided_on,
        })?;

        let status = decision.document_status();
        self.documents.set_status(document_id, status)?;
        document.status = status;
        info!(document = %document_id.0, status = status.label(), "validation recorded");
        Ok(document)
    }

    /// True when any of the student's applications currently has a rejected
    /// document. Resubmission starts a fresh round, so only the latest
    /// document per kind counts; superseded rounds are history. Zero
    /// applications yields false.
    pub fn has_any_rejected(&self, student_id: &StudentId) -> Result<bool, AidServiceError> {
        for application in self.applications.by_student(student_id)? {
            let documents = self.documents.by_application(&application.id)?;
            let mut current: BTreeMap<&str, &DocumentRecord> = BTreeMap::new();
            for document in &documents {
                // Highest id wins per kind; row order is not a chronology.
                match current.get(document.kind.0.as_str()) {
                    Some(existing) if existing.id.0 >= document.id.0 => {}
                    _ => {
                        current.insert(document.kind.0.as_str(), document);
                    }
                }
            }
            if current
                .values()
                .any(|document| document.status == DocumentStatus::Rejected)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Chronological validation history for one document.
    pub fn validation_history(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<ValidationRecord>, AidServiceError> {
        self.documents
            .fetch(document_id)?
            .ok_or_else(|| AidServiceError::not_found("document", &document_id.0))?;
        let mut history = self.documents.validations(document_id)?;
        // Validation ids are sequential, so id order is decision order.
        history.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(history)
    }
}
