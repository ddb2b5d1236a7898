use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

use super::domain::{
    AnnouncementId, ApplicationId, ApplicationRecord, ApplicationStatus, DocumentId,
    DocumentKind, DocumentRecord, DocumentStatus, StudentId,
};
use super::error::AidServiceError;
use super::repository::{
    AnnouncementRepository, ApplicationRepository, DocumentRepository, PendingDocuments,
    StudentDirectory,
};

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("ins-{id:06}"))
}

/// Partial update applied to an application. Absent fields are left as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationPatch {
    pub student_id: Option<StudentId>,
    pub announcement_id: Option<AnnouncementId>,
    pub submitted_on: Option<NaiveDate>,
    pub status: Option<ApplicationStatus>,
}

/// Owns an application's status machine and its relations to a student, an
/// announcement, and its documents.
pub struct ApplicationManager<A, E, D, S> {
    applications: Arc<A>,
    announcements: Arc<E>,
    documents: Arc<D>,
    students: Arc<S>,
}

impl<A, E, D, S> ApplicationManager<A, E, D, S>
where
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
    D: DocumentRepository + 'static,
    S: StudentDirectory + 'static,
{
    pub fn new(
        applications: Arc<A>,
        announcements: Arc<E>,
        documents: Arc<D>,
        students: Arc<S>,
    ) -> Self {
        Self {
            applications,
            announcements,
            documents,
            students,
        }
    }

    /// Create a PENDENTE application for one student against one
    /// announcement. Attachment of pre-uploaded documents is all-or-nothing:
    /// every listed document must exist before anything is written.
    pub fn create_application(
        &self,
        student_id: &StudentId,
        announcement_id: &AnnouncementId,
        document_ids: &[DocumentId],
        submitted_on: NaiveDate,
    ) -> Result<ApplicationRecord, AidServiceError> {
        self.students
            .fetch(student_id)?
            .ok_or_else(|| AidServiceError::not_found("student", &student_id.0))?;
        self.announcements
            .fetch(announcement_id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &announcement_id.0))?;

        for document_id in document_ids {
            self.documents
                .fetch(document_id)?
                .ok_or_else(|| AidServiceError::not_found("document", &document_id.0))?;
        }

        let record = ApplicationRecord {
            id: next_application_id(),
            student_id: student_id.clone(),
            announcement_id: announcement_id.clone(),
            submitted_on,
            status: ApplicationStatus::Pending,
        };
        let stored = self.applications.insert(record)?;

        // Every id was resolved above, so attach cannot report NotFound
        // mid-loop; under the port contract the loop only stops on outage.
        for document_id in document_ids {
            self.documents.attach(document_id, &stored.id)?;
        }

        info!(application = %stored.id.0, student = %student_id.0, "application created");
        Ok(stored)
    }

    /// Merge a partial update. Re-validates any supplied reference, refuses
    /// status changes on terminal applications, and refuses APROVADA while a
    /// required document kind lacks an APROVADO submission.
    pub fn update_application(
        &self,
        application_id: &ApplicationId,
        patch: ApplicationPatch,
    ) -> Result<ApplicationRecord, AidServiceError> {
        let mut record = self
            .applications
            .fetch(application_id)?
            .ok_or_else(|| AidServiceError::not_found("application", &application_id.0))?;

        if let Some(student_id) = patch.student_id {
            self.students
                .fetch(&student_id)?
                .ok_or_else(|| AidServiceError::not_found("student", &student_id.0))?;
            record.student_id = student_id;
        }
        if let Some(announcement_id) = patch.announcement_id {
            self.announcements
                .fetch(&announcement_id)?
                .ok_or_else(|| AidServiceError::not_found("announcement", &announcement_id.0))?;
            record.announcement_id = announcement_id;
        }
        if let Some(submitted_on) = patch.submitted_on {
            record.submitted_on = submitted_on;
        }

        if let Some(status) = patch.status {
            if status != record.status {
                if record.status.is_terminal() {
                    return Err(AidServiceError::InvalidState(format!(
                        "application {} is {} and cannot change status",
                        application_id.0,
                        record.status.label()
                    )));
                }
                if status == ApplicationStatus::Approved {
                    self.ensure_required_documents_approved(&record)?;
                }
                info!(
                    application = %application_id.0,
                    from = record.status.label(),
                    to = status.label(),
                    "application status change"
                );
                record.status = status;
            }
        }

        self.applications.update(record.clone())?;
        Ok(record)
    }

    pub fn get(&self, application_id: &ApplicationId) -> Result<ApplicationRecord, AidServiceError> {
        self.applications
            .fetch(application_id)?
            .ok_or_else(|| AidServiceError::not_found("application", &application_id.0))
    }

    /// Per-application projection of documents still PENDENTE, omitting
    /// applications with none pending. Pure read.
    pub fn list_pending_documents(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<PendingDocuments>, AidServiceError> {
        let mut views = Vec::new();
        for application in self.applications.by_student(student_id)? {
            let pending: Vec<DocumentRecord> = self
                .documents
                .by_application(&application.id)?
                .into_iter()
                .filter(|document| document.status == DocumentStatus::Pending)
                .collect();
            if pending.is_empty() {
                continue;
            }
            views.push(PendingDocuments {
                application_id: application.id,
                announcement_id: application.announcement_id,
                documents: pending,
            });
        }
        Ok(views)
    }

    /// APROVADA requires, for every required kind of the announcement, a
    /// current document of that kind at APROVADO. The latest document per
    /// kind is authoritative; earlier rounds are history.
    fn ensure_required_documents_approved(
        &self,
        record: &ApplicationRecord,
    ) -> Result<(), AidServiceError> {
        let announcement = self
            .announcements
            .fetch(&record.announcement_id)?
            .ok_or_else(|| {
                AidServiceError::not_found("announcement", &record.announcement_id.0)
            })?;

        let documents = self.documents.by_application(&record.id)?;
        for kind in &announcement.required_documents {
            let current = latest_of_kind(&documents, kind);
            match current {
                Some(document) if document.status == DocumentStatus::Approved => {}
                Some(document) => {
                    return Err(AidServiceError::InvalidState(format!(
                        "required document {} is {}, not APROVADO",
                        kind.0,
                        document.status.label()
                    )));
                }
                None => {
                    return Err(AidServiceError::InvalidState(format!(
                        "required document {} was never submitted",
                        kind.0
                    )));
                }
            }
        }
        Ok(())
    }
}

// Document ids are issued as a zero-padded sequence, so the lexicographic
// maximum is the newest submission whatever order the port returns rows in.
fn latest_of_kind<'a>(
    documents: &'a [DocumentRecord],
    kind: &DocumentKind,
) -> Option<&'a DocumentRecord> {
    documents
        .iter()
        .filter(|document| &document.kind == kind)
        .max_by(|a, b| a.id.0.cmp(&b.id.0))
}
