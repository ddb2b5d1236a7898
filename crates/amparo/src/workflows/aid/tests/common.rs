use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::workflows::aid::announcements::AnnouncementManager;
use crate::workflows::aid::applications::ApplicationManager;
use crate::workflows::aid::benefits::BenefitActivator;
use crate::workflows::aid::documents::DocumentValidationTracker;
use crate::workflows::aid::domain::{
    AnnouncementDraft, AnnouncementGraph, AnnouncementId, AnnouncementRecord, AnnouncementStatus,
    ApplicationId, ApplicationNode, ApplicationRecord, BenefitId, BenefitRecord, DocumentId,
    DocumentKind, DocumentRecord, DocumentStatus, StageDraft, StageId, StageNode, StageRecord,
    StageResultRecord, StudentId, StudentRecord, ValidationRecord,
};
use crate::workflows::aid::repository::{
    AnnouncementRepository, ApplicationRepository, BenefitRepository, DocumentRepository,
    NotificationError, NotificationPublisher, RepositoryError, RetractionUnitOfWork,
    StatusChangeNotice, StudentDirectory,
};

pub(super) type Announcements = AnnouncementManager<MemoryStore, MemoryStore, MemoryStore>;
pub(super) type Applications =
    ApplicationManager<MemoryStore, MemoryStore, MemoryStore, MemoryStore>;
pub(super) type Documents = DocumentValidationTracker<MemoryStore, MemoryStore, MemoryStore>;
pub(super) type Benefits = BenefitActivator<MemoryStore, MemoryStore, MemoryStore>;

pub(super) fn day(year: i32, month: u32, dom: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, dom).expect("valid date")
}

#[derive(Default, Clone)]
pub(super) struct Tables {
    pub(super) students: Vec<StudentRecord>,
    pub(super) announcements: Vec<AnnouncementRecord>,
    pub(super) stages: Vec<StageRecord>,
    pub(super) stage_results: Vec<StageResultRecord>,
    pub(super) applications: Vec<ApplicationRecord>,
    pub(super) documents: Vec<DocumentRecord>,
    pub(super) validations: Vec<ValidationRecord>,
    pub(super) benefits: Vec<BenefitRecord>,
}

/// Single mutex-guarded table set backing every storage port, so the
/// managers can be exercised together against one consistent state.
#[derive(Default)]
pub(super) struct MemoryStore {
    tables: Mutex<Tables>,
    fail_announcement_delete: AtomicBool,
}

impl MemoryStore {
    pub(super) fn seed_student(&self, id: &str) -> StudentId {
        let student = StudentRecord {
            id: StudentId(id.to_string()),
            full_name: format!("Student {id}"),
            registration: format!("reg-{id}"),
        };
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.students.push(student.clone());
        student.id
    }

    /// Make the next retraction fail at the final announcement delete, to
    /// exercise rollback classification.
    pub(super) fn fail_on_announcement_delete(&self) {
        self.fail_announcement_delete.store(true, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> Tables {
        self.tables.lock().expect("store mutex poisoned").clone()
    }
}

impl StudentDirectory for MemoryStore {
    fn fetch(&self, id: &StudentId) -> Result<Option<StudentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.students.iter().find(|s| &s.id == id).cloned())
    }
}

impl AnnouncementRepository for MemoryStore {
    fn insert_graph(
        &self,
        announcement: AnnouncementRecord,
        stages: Vec<StageRecord>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.announcements.iter().any(|a| a.id == announcement.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.announcements.push(announcement);
        tables.stages.extend(stages);
        Ok(())
    }

    fn fetch(&self, id: &AnnouncementId) -> Result<Option<AnnouncementRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.announcements.iter().find(|a| &a.id == id).cloned())
    }

    fn fetch_graph(
        &self,
        id: &AnnouncementId,
    ) -> Result<Option<AnnouncementGraph>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let Some(announcement) = tables.announcements.iter().find(|a| &a.id == id).cloned()
        else {
            return Ok(None);
        };
        let stages = tables
            .stages
            .iter()
            .filter(|stage| &stage.announcement_id == id)
            .map(|stage| StageNode {
                stage: stage.clone(),
                results: tables
                    .stage_results
                    .iter()
                    .filter(|result| result.stage_id == stage.id)
                    .cloned()
                    .collect(),
            })
            .collect();
        let applications = tables
            .applications
            .iter()
            .filter(|application| &application.announcement_id == id)
            .map(|application| ApplicationNode {
                application: application.clone(),
                documents: tables
                    .documents
                    .iter()
                    .filter(|document| document.application_id == application.id)
                    .cloned()
                    .collect(),
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
        let slot = tables
            .announcements
            .iter_mut()
            .find(|a| a.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = record;
        Ok(())
    }

    fn insert_stage(&self, stage: StageRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.stages.push(stage);
        Ok(())
    }

    fn fetch_stage(&self, id: &StageId) -> Result<Option<StageRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.stages.iter().find(|s| &s.id == id).cloned())
    }

    fn stages(
        &self,
        announcement_id: &AnnouncementId,
    ) -> Result<Vec<StageRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        let mut stages: Vec<StageRecord> = tables
            .stages
            .iter()
            .filter(|stage| &stage.announcement_id == announcement_id)
            .cloned()
            .collect();
        stages.sort_by_key(|stage| stage.order_index);
        Ok(stages)
    }

    fn stage_results(
        &self,
        stage_id: &StageId,
    ) -> Result<Vec<StageResultRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .stage_results
            .iter()
            .filter(|result| &result.stage_id == stage_id)
            .cloned()
            .collect())
    }

    fn upsert_stage_result(&self, result: StageResultRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if let Some(slot) = tables.stage_results.iter_mut().find(|r| r.id == result.id) {
            *slot = result;
        } else {
            tables.stage_results.push(result);
        }
        Ok(())
    }

    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn RetractionUnitOfWork) -> Result<(), RepositoryError>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let mut scratch = tables.clone();
        {
            let mut tx = MemoryUnitOfWork {
                tables: &mut scratch,
                fail_announcement_delete: self
                    .fail_announcement_delete
                    .swap(false, Ordering::Relaxed),
            };
            work(&mut tx)?;
        }
        *tables = scratch;
        Ok(())
    }
}

struct MemoryUnitOfWork<'a> {
    tables: &'a mut Tables,
    fail_announcement_delete: bool,
}

impl RetractionUnitOfWork for MemoryUnitOfWork<'_> {
    fn delete_stage_results(&mut self, stage_id: &StageId) -> Result<usize, RepositoryError> {
        let before = self.tables.stage_results.len();
        self.tables
            .stage_results
            .retain(|result| &result.stage_id != stage_id);
        Ok(before - self.tables.stage_results.len())
    }

    fn delete_validations(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<DocumentId> = self
            .tables
            .documents
            .iter()
            .filter(|document| &document.application_id == application_id)
            .map(|document| document.id.clone())
            .collect();
        let before = self.tables.validations.len();
        self.tables
            .validations
            .retain(|validation| !owned.contains(&validation.document_id));
        Ok(before - self.tables.validations.len())
    }

    fn delete_documents(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<DocumentId> = self
            .tables
            .documents
            .iter()
            .filter(|document| &document.application_id == application_id)
            .map(|document| document.id.clone())
            .collect();
        if self
            .tables
            .validations
            .iter()
            .any(|validation| owned.contains(&validation.document_id))
        {
            return Err(RepositoryError::ForeignKey(
                "validations still reference documents".to_string(),
            ));
        }
        let before = self.tables.documents.len();
        self.tables
            .documents
            .retain(|document| &document.application_id != application_id);
        Ok(before - self.tables.documents.len())
    }

    fn delete_application(
        &mut self,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        if self
            .tables
            .documents
            .iter()
            .any(|document| &document.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "documents still reference application".to_string(),
            ));
        }
        if self
            .tables
            .stage_results
            .iter()
            .any(|result| &result.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference application".to_string(),
            ));
        }
        if self
            .tables
            .benefits
            .iter()
            .any(|benefit| &benefit.application_id == application_id)
        {
            return Err(RepositoryError::ForeignKey(
                "benefit still references application".to_string(),
            ));
        }
        let before = self.tables.applications.len();
        self.tables
            .applications
            .retain(|application| &application.id != application_id);
        if self.tables.applications.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn delete_stage(&mut self, stage_id: &StageId) -> Result<(), RepositoryError> {
        if self
            .tables
            .stage_results
            .iter()
            .any(|result| &result.stage_id == stage_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference stage".to_string(),
            ));
        }
        let before = self.tables.stages.len();
        self.tables.stages.retain(|stage| &stage.id != stage_id);
        if self.tables.stages.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn delete_stages(
        &mut self,
        announcement_id: &AnnouncementId,
    ) -> Result<usize, RepositoryError> {
        let owned: Vec<StageId> = self
            .tables
            .stages
            .iter()
            .filter(|stage| &stage.announcement_id == announcement_id)
            .map(|stage| stage.id.clone())
            .collect();
        if self
            .tables
            .stage_results
            .iter()
            .any(|result| owned.contains(&result.stage_id))
        {
            return Err(RepositoryError::ForeignKey(
                "stage results still reference stages".to_string(),
            ));
        }
        let before = self.tables.stages.len();
        self.tables
            .stages
            .retain(|stage| &stage.announcement_id != announcement_id);
        Ok(before - self.tables.stages.len())
    }

    fn delete_announcement(
        &mut self,
        announcement_id: &AnnouncementId,
    ) -> Result<(), RepositoryError> {
        if self.fail_announcement_delete {
            return Err(RepositoryError::Unavailable("storage offline".to_string()));
        }
        if self
            .tables
            .stages
            .iter()
            .any(|stage| &stage.announcement_id == announcement_id)
        {
            return Err(RepositoryError::ForeignKey(
                "stages still reference announcement".to_string(),
            ));
        }
        if self
            .tables
            .applications
            .iter()
            .any(|application| &application.announcement_id == announcement_id)
        {
            return Err(RepositoryError::ForeignKey(
                "applications still reference announcement".to_string(),
            ));
        }
        let before = self.tables.announcements.len();
        self.tables
            .announcements
            .retain(|announcement| &announcement.id != announcement_id);
        if self.tables.announcements.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

impl ApplicationRepository for MemoryStore {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.applications.iter().any(|a| a.id == record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.applications.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.applications.iter().find(|a| &a.id == id).cloned())
    }

    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .applications
            .iter_mut()
            .find(|a| a.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = record;
        Ok(())
    }

    fn by_student(&self, id: &StudentId) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .applications
            .iter()
            .filter(|application| &application.student_id == id)
            .cloned()
            .collect())
    }

    fn by_announcement(
        &self,
        id: &AnnouncementId,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .applications
            .iter()
            .filter(|application| &application.announcement_id == id)
            .cloned()
            .collect())
    }
}

impl DocumentRepository for MemoryStore {
    fn insert(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables.documents.iter().any(|d| d.id == record.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.documents.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.documents.iter().find(|d| &d.id == id).cloned())
    }

    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.status = status;
        Ok(())
    }

    fn attach(
        &self,
        id: &DocumentId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .documents
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or(RepositoryError::NotFound)?;
        slot.application_id = application_id.clone();
        Ok(())
    }

    fn by_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .documents
            .iter()
            .filter(|document| &document.application_id == id)
            .cloned()
            .collect())
    }

    fn append_validation(&self, record: ValidationRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        tables.validations.push(record);
        Ok(())
    }

    fn validations(&self, id: &DocumentId) -> Result<Vec<ValidationRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .validations
            .iter()
            .filter(|validation| &validation.document_id == id)
            .cloned()
            .collect())
    }
}

impl BenefitRepository for MemoryStore {
    fn insert_unique(&self, record: BenefitRecord) -> Result<BenefitRecord, RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        if tables
            .benefits
            .iter()
            .any(|benefit| benefit.application_id == record.application_id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.benefits.push(record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &BenefitId) -> Result<Option<BenefitRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables.benefits.iter().find(|b| &b.id == id).cloned())
    }

    fn by_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<BenefitRecord>, RepositoryError> {
        let tables = self.tables.lock().expect("store mutex poisoned");
        Ok(tables
            .benefits
            .iter()
            .find(|benefit| &benefit.application_id == id)
            .cloned())
    }

    fn update(&self, record: BenefitRecord) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let slot = tables
            .benefits
            .iter_mut()
            .find(|b| b.id == record.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = record;
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    events: Mutex<Vec<StatusChangeNotice>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<StatusChangeNotice> {
        self.events.lock().expect("notice mutex poisoned").clone()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, notice: StatusChangeNotice) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notice mutex poisoned")
            .push(notice);
        Ok(())
    }
}

/// Benefit port that always reports a duplicate, simulating a concurrent
/// reconcile winning the insert race.
#[derive(Default)]
pub(super) struct ConflictBenefits;

impl BenefitRepository for ConflictBenefits {
    fn insert_unique(&self, _record: BenefitRecord) -> Result<BenefitRecord, RepositoryError> {
        Err(RepositoryError::Conflict)
    }

    fn fetch(&self, _id: &BenefitId) -> Result<Option<BenefitRecord>, RepositoryError> {
        Ok(None)
    }

    fn by_application(
        &self,
        _id: &ApplicationId,
    ) -> Result<Option<BenefitRecord>, RepositoryError> {
        Ok(None)
    }

    fn update(&self, _record: BenefitRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::NotFound)
    }
}

/// Document port that hands listing rows back newest-first. Adapters make no
/// ordering promise, so the managers must derive chronology from the ids.
pub(super) struct NewestFirstDocuments(pub(super) Arc<MemoryStore>);

impl DocumentRepository for NewestFirstDocuments {
    fn insert(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        DocumentRepository::insert(self.0.as_ref(), record)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        DocumentRepository::fetch(self.0.as_ref(), id)
    }

    fn set_status(&self, id: &DocumentId, status: DocumentStatus) -> Result<(), RepositoryError> {
        self.0.set_status(id, status)
    }

    fn attach(
        &self,
        id: &DocumentId,
        application_id: &ApplicationId,
    ) -> Result<(), RepositoryError> {
        self.0.attach(id, application_id)
    }

    fn by_application(&self, id: &ApplicationId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut rows = DocumentRepository::by_application(self.0.as_ref(), id)?;
        rows.reverse();
        Ok(rows)
    }

    fn append_validation(&self, record: ValidationRecord) -> Result<(), RepositoryError> {
        self.0.append_validation(record)
    }

    fn validations(&self, id: &DocumentId) -> Result<Vec<ValidationRecord>, RepositoryError> {
        let mut rows = self.0.validations(id)?;
        rows.reverse();
        Ok(rows)
    }
}

pub(super) fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::default())
}

pub(super) fn managers(
    store: &Arc<MemoryStore>,
) -> (Announcements, Applications, Documents, Benefits) {
    (
        AnnouncementManager::new(store.clone(), store.clone(), store.clone()),
        ApplicationManager::new(store.clone(), store.clone(), store.clone(), store.clone()),
        DocumentValidationTracker::new(store.clone(), store.clone(), store.clone()),
        BenefitActivator::new(store.clone(), store.clone(), store.clone()),
    )
}

/// One announcement cycle wired against a shared store, with one seeded
/// student. Most tests start here.
pub(super) struct Fixture {
    pub(super) store: Arc<MemoryStore>,
    pub(super) announcements: Announcements,
    pub(super) applications: Applications,
    pub(super) documents: Documents,
    pub(super) benefits: Benefits,
    pub(super) student: StudentId,
    pub(super) announcement: AnnouncementRecord,
}

impl Fixture {
    pub(super) fn snapshot_documents(&self, application: &ApplicationRecord) -> usize {
        self.store
            .snapshot()
            .documents
            .iter()
            .filter(|document| document.application_id == application.id)
            .count()
    }
}

pub(super) fn fixture(required: &[&str]) -> Fixture {
    let store = store();
    let (announcements, applications, documents, benefits) = managers(&store);
    let student = store.seed_student("stu-0001");
    let announcement = announcements
        .create_announcement(draft(required, 2))
        .expect("announcement creation succeeds");
    Fixture {
        store,
        announcements,
        applications,
        documents,
        benefits,
        student,
        announcement,
    }
}

pub(super) fn blob(name: &str) -> crate::workflows::aid::domain::BlobHandle {
    crate::workflows::aid::domain::BlobHandle(format!("blob://{name}"))
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn draft(required: &[&str], stage_count: usize) -> AnnouncementDraft {
    AnnouncementDraft {
        title: "Auxilio Moradia 2026".to_string(),
        description: "Housing aid for enrolled students".to_string(),
        category_tags: vec!["MORADIA".to_string()],
        required_documents: required
            .iter()
            .map(|kind| DocumentKind(kind.to_string()))
            .collect(),
        status: AnnouncementStatus::Active,
        total_openings: 40,
        stages: (0..stage_count)
            .map(|index| StageDraft {
                name: format!("Etapa {}", index + 1),
                order_index: index as u32,
                starts_on: day(2026, 3, 1 + index as u32),
                ends_on: day(2026, 3, 10 + index as u32),
            })
            .collect(),
    }
}
