use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use amparo::workflows::aid::{
    AnnouncementGraph, AnnouncementId, AnnouncementRecord, ApplicationId, ApplicationNode,
    ApplicationRecord, BenefitId, BenefitRecord, BlobHandle, BlobStore, BlobStoreError,
    DocumentId, DocumentRecord, DocumentStatus, NotificationError, NotificationPublisher,
    RepositoryError, RetractionUnitOfWork, StageId, StageNode, StageRecord, StageResultId,
    StageResultRecord, StatusChangeNotice, StudentId, StudentRecord, ValidationId,
    ValidationRecord,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
struct Tables {
    students: HashMap<StudentId, StudentRecord>,
    announcements: HashMap<AnnouncementId, AnnouncementRecord>,
    stages: HashMap<StageId, StageRecord>,
    stage_results: HashMap<StageResultId, StageResultRecord>,
    applications: HashMap<ApplicationId, ApplicationRecord>,
    documents: HashMap<DocumentId, DocumentRecord>,
    validations: HashMap<ValidationId, ValidationRecord>,
    benefits: HashMap<BenefitId, BenefitRecord>,
}

/// Single-process store backing every aid port. Listings are sorted by the
/// zero-padded ids for stable output; the managers themselves never depend
/// on row order.
#[derive(Default)]
pub(crate) struct InMemoryAidStore {
    tables: Mutex<Tables>,
}

impl InMemoryAidStore {
    /// Register a student in the roster the engine resolves against.
    pub(crate) fn seed_student(&self, id: &str, full_name: &str, registration: &str) {
        let student = StudentRecord {
            id: StudentId(id.to_string()),
            full_name: full_name.to_string(),
            registration: registration.to_string(),
        };
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.students.insert(student.id.clone(), student);
    }
}

fn sorted_by<T, I>(mut rows: Vec<T>, key: impl Fn(&T) -> I) -> Vec<T>
where
    I: Ord,
{
    rows.sort_by_key(key);
    rows
}

impl amparo::workflows::aid::StudentDirectory for InMemoryAidStore {
    fn fetch(&self, id: &StudentId) -> Result<Option<StudentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.students.get(id).cloned())
    }
}

impl amparo::workflows::aid::AnnouncementRepository for InMemoryAidStore {
    fn insert_graph(
        &self,
        announcement: AnnouncementRecord,
        stages: Vec<StageRecord>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.announcements.contains_key(&announcement.id) {
            return Err(RepositoryError::Conflict);
        }
        tables
            .announcements
            .insert(announcement.id.clone(), announcement);
        for stage in stages {
            tables.stages.insert(stage.id.clone(), stage);
        }
        Ok(())
    }

    fn fetch(&self, id: &AnnouncementId) -> Result<Option<AnnouncementRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.announcements.get(id).cloned())
    }

    fn fetch_graph(
        &self,
        id: &AnnouncementId,
    ) -> Result<Option<AnnouncementGraph>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let Some(announcement) = tables.announcements.get(id).cloned() else {
            return Ok(None);
        };
        let stages = sorted_by(
            tables
                .stages
                .values()
                .filter(|stage| &stage.announcement_id == id)
                .cloned()
                .collect(),
            |stage: &StageRecord| stage.order_index,
        )
        .into_iter()
        .map(|stage| {
            let results = tables
                .stage_results
                .values()
                .filter(|result| result.stage_id == stage.id)
                .cloned()
                .collect();
            StageNode { stage, results }
        })
        .collect();
        let applications = sorted_by(
            tables
                .applications
                .values()
                .filter(|application| &application.announcement_id == id)
                .cloned()
                .collect(),
            |application: &ApplicationRecord| application.id.0.clone(),
        )
        .into_iter()
        .map(|application| {
            let documents = sorted_by(
                tables
                    .documents
                    .values()
                    .filter(|document| document.application_id == application.id)
                    .cloned()
                    .collect(),
                |document: &DocumentRecord| document.id.0.clone(),
            );
            ApplicationNode {
                application,
                documents,
            }
        })
        .collect();
        Ok(Some(AnnouncementGraph {
            announcement,
            stages,
            applications,
        }))
    }

    fn update(&self, record: AnnouncementRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.announcements.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.announcements.insert(record.id.clone(), record);
        Ok(())
    }

    fn insert_stage(&self, stage: StageRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.stages.insert(stage.id.clone(), stage);
        Ok(())
    }

    fn fetch_stage(&self, id: &StageId) -> Result<Option<StageRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.stages.get(id).cloned())
    }

    fn stages(
        &self,
        announcement_id: &AnnouncementId,
    ) -> Result<Vec<StageRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(sorted_by(
            tables
                .stages
                .values()
                .filter(|stage| &stage.announcement_id == announcement_id)
                .cloned()
                .collect(),
            |stage: &StageRecord| stage.order_index,
        ))
    }

    fn stage_results(
        &self,
        stage_id: &StageId,
    ) -> Result<Vec<StageResultRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .stage_results
            .values()
            .filter(|result| &result.stage_id == stage_id)
            .cloned()
            .collect())
    }

    fn upsert_stage_result(&self, result: StageResultRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.stage_results.insert(result.id.clone(), result);
        Ok(())
    }

    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn RetractionUnitOfWork) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        // Copy-apply-swap: an error inside the closure drops the scratch
        // copy and leaves the live tables untouched.
        let mut scratch = tables.clone();
        work(&mut StoreUnitOfWork {
            tables: &mut scratch,
        })?;
        *tables = scratch;
        Ok(())
    }
}

struct StoreUnitOfWork<'a> {
    tables: &'a mut Tables,
}

impl RetractionUnitOfWork for StoreUnitOfWork<'_> {
    fn delete_stage_results(&mut self, stage_id: &StageId) -> Result<usize, RepositoryError> {
        let before = self.tables.stage_results.len();
        self.tables
            .stage_results
            .retain(|_, result| &result.stage_id != stage_id);
        Ok(before - self.tables.stage_results.len())
    }

    fn delete_validations(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<DocumentId> = self
            .tables
            .documents
            .values()
            .filter(|document| &document.application_id == application_id)
            .map(|document| document.id.clone())
            .collect();
        let before = self.tables.validations.len();
        self.tables
            .validations
            .retain(|_, validation| !owned.contains(&validation.document_id));
        Ok(before - self.tables.validations.len())
    }

    fn delete_documents(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<DocumentId> = self
            .tables
            .documents
            .values()
            .filter(|document| &document.application_id == application_id)
            .map(|document| document.id.clone())
            .collect();
        if self
            .tables
            .validations
            .values()
            .any(|validation| owned.contains(&validation.document_id))
        {
            return Err(RepositoryError::ForeignKey(
                "validations still reference documents".to_string(),
            ));
        }
        let before = self.tables.documents.len();
        self.tables
            .documents
            .retain(|_, document| &document.application_id != application_id);
        Ok(before - self.tables.documents.len())
    }

    fn delete_application(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        if self
            .tables
            .documents
            .values()
            .any(|document| &document.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "documents still reference application".to_string(),
            ));
        }
        if self
            .tables
            .stage_results
            .values()
            .any(|result| &result.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference application".to_string(),
            ));
        }
        if self
            .tables
            .benefits
            .values()
            .any(|benefit| &benefit.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "benefit still references application".to_string(),
            ));
        }
        self.tables
            .applications
            .remove(application_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn delete_stage(&mut self, stage_id: &StageId) -> Result<(), RepositoryError> {
        if self
            .tables
            .stage_results
            .values()
            .any(|result| &result.stage_id == stage_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference stage".to_string(),
            ));
        }
        self.tables
            .stages
            .remove(stage_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn delete_stages(
        &mut self,
        announcement_id: &AnnouncementId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<StageId> = self
            .tables
            .stages
            .values()
            .filter(|stage| &stage.announcement_id == announcement_id)
            .map(|stage| stage.id.clone())
            .collect();
        if self
            .tables
            .stage_results
            .values()
            .any(|result| owned.contains(&result.stage_id))
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference stages".to_string(),
            ));
        }
        let before = self.tables.stages.len();
        self.tables
            .stages
            .retain(|_, stage| &stage.announcement_id != announcement_id);
        Ok(before - self.tables.stages.len())
    }

    fn delete_announcement(
        &mut self,
        announcement_id: &AnnouncementId,
    ) -> Result<(), RepositoryError> {
        if self
            .tables
            .stages
            .values()
            .any(|stage| &stage.announcement_id == announcement_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stages still reference announcement".to_string(),
            ));
        }
        if self
            .tables
            .applications
            .values()
            .any(|application| &application.announcement_id == announcement_id)
        {
            return Err(RepositoryError::ForeignKey(
                "applications still reference announcement".to_string(),
            ));
        }
        self.tables
            .announcements
            .remove(announcement_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

impl amparo::workflows::aid::ApplicationRepository for InMemoryAidStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.applications.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.applications.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.applications.get(id).cloned())
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.applications.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.applications.insert(record.id.clone(), record);
        Ok(())
    }

    fn by_student(&self, id: &StudentId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(sorted_by(
            tables
                .applications
                .values()
                .filter(|application| &application.student_id == id)
                .cloned()
                .collect(),
            |application: &ApplicationRecord| application.id.0.clone(),
        ))
    }

    fn by_announcement(
        &self,
        id: &AnnouncementId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(sorted_by(
            tables
                .applications
                .values()
                .filter(|application| &application.announcement_id == id)
                .cloned()
                .collect(),
            |application: &ApplicationRecord| application.id.0.clone(),
        ))
    }
}

impl amparo::workflows::aid::DocumentRepository for InMemoryAidStore {
    fn insert(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.documents.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.documents.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.documents.get(id).cloned())
    }

    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let document = tables
            .documents
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        document.status = status;
        Ok(())
    }

    fn attach(
        &self,
        id: &DocumentId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let document = tables
            .documents
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        document.application_id = application_id.clone();
        Ok(())
    }

    fn by_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(sorted_by(
            tables
                .documents
                .values()
                .filter(|document| &document.application_id == id)
                .cloned()
                .collect(),
            |document: &DocumentRecord| document.id.0.clone(),
        ))
    }

    fn append_validation(&self, record: ValidationRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.validations.insert(record.id.clone(), record);
        Ok(())
    }

    fn validations(&self, id: &DocumentId) -> Result<Vec<ValidationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(sorted_by(
            tables
                .validations
                .values()
                .filter(|validation| &validation.document_id == id)
                .cloned()
                .collect(),
            |validation: &ValidationRecord| validation.id.0.clone(),
        ))
    }
}

impl amparo::workflows::aid::BenefitRepository for InMemoryAidStore {
    fn insert_unique(&self, record: BenefitRecord) -> Result<BenefitRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables
            .benefits
            .values()
            .any(|benefit| benefit.application_id == record.application_id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.benefits.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &BenefitId) -> Result<Option<BenefitRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.benefits.get(id).cloned())
    }

    fn by_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<BenefitRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .benefits
            .values()
            .find(|benefit| &benefit.application_id == id)
            .cloned())
    }

    fn update(&self, record: BenefitRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if !tables.benefits.contains_key(&record.id) {
            return Err(RepositoryError::NotFound);
        }
        tables.benefits.insert(record.id.clone(), record);
        Ok(())
    }
}

/// Blob storage backed by process memory. Handles are opaque to callers.
#[derive(Default)]
pub(crate) struct InMemoryBlobStore {
    blobs: Mutex<HashMap<BlobHandle, Vec<u8>>>,
    sequence: AtomicU64,
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, bytes: Vec<u8>) -> Result<BlobHandle, BlobStoreError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = BlobHandle(format!("mem://{id:08}"));
        let mut blobs = self.blobs.lock().expect("blob mutex poisoned");
        blobs.insert(handle.clone(), bytes);
        Ok(handle)
    }

    fn get(&self, handle: &BlobHandle) -> Result<Vec<u8>, BlobStoreError> {
        let blobs = self.blobs.lock().expect("blob mutex poisoned");
        blobs.get(handle).cloned().ok_or(BlobStoreError::NotFound)
    }
}

/// Outbound e-mail stand-in: status notices land in the service log until a
/// real transport is wired up.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotificationPublisher;

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, notice: StatusChangeNotice) -> Result<(), NotificationError> {
        info!(
            application = %notice.application_id.0,
            student = %notice.student_id.0,
            status = notice.status.label(),
            "application status notice"
        );
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
