use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::domain::{
    AnnouncementId, AnnouncementStatus, ApplicationStatus, BenefitId, BenefitRecord,
    BenefitStatus, StudentId,
};
use super::error::AidServiceError;
use super::repository::{
    AnnouncementRepository, ApplicationRepository, BenefitRepository, BenefitView,
    RepositoryError,
};

static BENEFIT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_benefit_id() -> BenefitId {
    let id = BENEFIT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BenefitId(format!("ben-{id:06}"))
}

/// Derives benefit rows from the combined state of applications and their
/// announcement. Creates benefit rows only; never touches application or
/// announcement rows.
pub struct BenefitActivator<B, A, E> {
    benefits: Arc<B>,
    applications: Arc<A>,
    announcements: Arc<E>,
}

impl<B, A, E> BenefitActivator<B, A, E>
where
    B: BenefitRepository + 'static,
    A: ApplicationRepository + 'static,
    E: AnnouncementRepository + 'static,
{
    pub fn new(benefits: Arc<B>, applications: Arc<A>, announcements: Arc<E>) -> Self {
        Self {
            benefits,
            applications,
            announcements,
        }
    }

    /// Materialize one ATIVO benefit per qualifying application of the
    /// announcement: status APROVADA, announcement DESATIVADO, no benefit
    /// yet. Ineligible applications are skipped silently, existing benefits
    /// are left untouched, so replaying the call is always safe.
    pub fn reconcile(
        &self,
        announcement_id: &AnnouncementId,
        on: NaiveDate,
    ) -> Result<Vec<BenefitRecord>, AidServiceError> {
        let announcement = self
            .announcements
            .fetch(announcement_id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &announcement_id.0))?;

        if announcement.status != AnnouncementStatus::Closed {
            return Ok(Vec::new());
        }

        let mut created = Vec::new();
        for application in self.applications.by_announcement(announcement_id)? {
            if application.status != ApplicationStatus::Approved {
                continue;
            }
            if self.benefits.by_application(&application.id)?.is_some() {
                continue;
            }

            let record = BenefitRecord {
                id: next_benefit_id(),
                application_id: application.id.clone(),
                starts_on: on,
                status: BenefitStatus::Active,
            };
            match self.benefits.insert_unique(record) {
                Ok(stored) => {
                    info!(
                        benefit = %stored.id.0,
                        application = %application.id.0,
                        "benefit activated"
                    );
                    created.push(stored);
                }
                // A concurrent reconcile got there first; the storage-level
                // uniqueness constraint makes this a no-op, not an error.
                Err(RepositoryError::Conflict) => continue,
                Err(other) => return Err(other.into()),
            }
        }
        Ok(created)
    }

    /// Active benefits for one student, each paired with its announcement's
    /// descriptive metadata. Empty when the student has no qualifying
    /// applications.
    pub fn list_active_benefits(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<BenefitView>, AidServiceError> {
        let mut views = Vec::new();
        for application in self.applications.by_student(student_id)? {
            let Some(benefit) = self.benefits.by_application(&application.id)? else {
                continue;
            };
            if benefit.status != BenefitStatus::Active {
                continue;
            }
            let announcement = self
                .announcements
                .fetch(&application.announcement_id)?
                .ok_or_else(|| {
                    AidServiceError::not_found("announcement", &application.announcement_id.0)
                })?;
            views.push(BenefitView {
                benefit_id: benefit.id,
                application_id: application.id,
                status: benefit.status,
                starts_on: benefit.starts_on,
                announcement_title: announcement.title,
                category_tags: announcement.category_tags,
            });
        }
        Ok(views)
    }

    /// Explicit administrative status change (suspend, end, reactivate).
    /// This is the only path that ever ends a benefit.
    pub fn set_status(
        &self,
        benefit_id: &BenefitId,
        status: BenefitStatus,
    ) -> Result<BenefitRecord, AidServiceError> {
        let mut record = self
            .benefits
            .fetch(benefit_id)?
            .ok_or_else(|| AidServiceError::not_found("benefit", &benefit_id.0))?;
        if record.status != status {
            info!(
                benefit = %benefit_id.0,
                from = record.status.label(),
                to = status.label(),
                "benefit status change"
            );
        }
        record.status = status;
        self.benefits.update(record.clone())?;
        Ok(record)
    }
}
