use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use super::domain::{
    AnnouncementDraft, AnnouncementId, AnnouncementRecord, AnnouncementStatus, ApplicationId,
    DocumentKind, StageDraft, StageId, StageRecord, StageResultId, StageResultRecord,
    StageResultStatus,
};
use super::error::AidServiceError;
use super::repository::{
    AnnouncementRepository, ApplicationRepository, BenefitRepository, RetractionOutcome,
};

static ANNOUNCEMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static STAGE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static STAGE_RESULT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_announcement_id() -> AnnouncementId {
    let id = ANNOUNCEMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AnnouncementId(format!("edt-{id:06}"))
}

fn next_stage_id() -> StageId {
    let id = STAGE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    StageId(format!("etp-{id:06}"))
}

fn next_stage_result_id() -> StageResultId {
    let id = STAGE_RESULT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    StageResultId(format!("res-{id:06}"))
}

/// Partial update applied to an announcement's own fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnouncementPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_tags: Option<Vec<String>>,
    pub required_documents: Option<Vec<DocumentKind>>,
    pub status: Option<AnnouncementStatus>,
    pub total_openings: Option<u32>,
}

/// Owns the announcement lifecycle, its stages and stage results, and the
/// cascading retraction. Announcements, stages, and stage results are
/// mutated through this manager only.
pub struct AnnouncementManager<E, A, B> {
    announcements: Arc<E>,
    applications: Arc<A>,
    benefits: Arc<B>,
}

impl<E, A, B> AnnouncementManager<E, A, B>
where
    E: AnnouncementRepository + 'static,
    A: ApplicationRepository + 'static,
    B: BenefitRepository + 'static,
{
    pub fn new(announcements: Arc<E>, applications: Arc<A>, benefits: Arc<B>) -> Self {
        Self {
            announcements,
            applications,
            benefits,
        }
    }

    /// Persist a new announcement and its stages as one object graph.
    /// Stage ordering must be unique and contiguous from zero.
    pub fn create_announcement(
        &self,
        draft: AnnouncementDraft,
    ) -> Result<AnnouncementRecord, AidServiceError> {
        ensure_contiguous_ordering(&draft.stages)?;

        let record = AnnouncementRecord {
            id: next_announcement_id(),
            title: draft.title,
            description: draft.description,
            category_tags: draft.category_tags,
            required_documents: draft.required_documents,
            status: draft.status,
            total_openings: draft.total_openings,
        };
        let stages: Vec<StageRecord> = draft
            .stages
            .into_iter()
            .map(|stage| StageRecord {
                id: next_stage_id(),
                announcement_id: record.id.clone(),
                name: stage.name,
                order_index: stage.order_index,
                starts_on: stage.starts_on,
                ends_on: stage.ends_on,
            })
            .collect();

        self.announcements.insert_graph(record.clone(), stages)?;
        info!(announcement = %record.id.0, "announcement created");
        Ok(record)
    }

    /// Merge announcement fields. Any status may be set by staff at any
    /// time; the lifecycle has no enforced transition graph.
    pub fn update_announcement(
        &self,
        id: &AnnouncementId,
        patch: AnnouncementPatch,
    ) -> Result<AnnouncementRecord, AidServiceError> {
        let mut record = self
            .announcements
            .fetch(id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &id.0))?;

        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(description) = patch.description {
            record.description = description;
        }
        if let Some(category_tags) = patch.category_tags {
            record.category_tags = category_tags;
        }
        if let Some(required_documents) = patch.required_documents {
            record.required_documents = required_documents;
        }
        if let Some(status) = patch.status {
            if status != record.status {
                info!(
                    announcement = %id.0,
                    from = record.status.label(),
                    to = status.label(),
                    "announcement status change"
                );
            }
            record.status = status;
        }
        if let Some(total_openings) = patch.total_openings {
            record.total_openings = total_openings;
        }

        self.announcements.update(record.clone())?;
        Ok(record)
    }

    pub fn get(&self, id: &AnnouncementId) -> Result<AnnouncementRecord, AidServiceError> {
        self.announcements
            .fetch(id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &id.0))
    }

    /// Stages of an announcement, sorted by their contiguous order index.
    pub fn stages(&self, id: &AnnouncementId) -> Result<Vec<StageRecord>, AidServiceError> {
        self.announcements
            .fetch(id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &id.0))?;
        let mut stages = self.announcements.stages(id)?;
        stages.sort_by_key(|stage| stage.order_index);
        Ok(stages)
    }

    /// Append one stage after the existing ones. The new index must extend
    /// the contiguous ordering.
    pub fn append_stage(
        &self,
        announcement_id: &AnnouncementId,
        draft: StageDraft,
    ) -> Result<StageRecord, AidServiceError> {
        self.announcements
            .fetch(announcement_id)?
            .ok_or_else(|| AidServiceError::not_found("announcement", &announcement_id.0))?;

        let existing = self.announcements.stages(announcement_id)?;
        let expected = existing.len() as u32;
        if draft.order_index != expected {
            return Err(AidServiceError::Validation(format!(
                "stage order index {} breaks contiguity, expected {}",
                draft.order_index, expected
            )));
        }

        let stage = StageRecord {
            id: next_stage_id(),
            announcement_id: announcement_id.clone(),
            name: draft.name,
            order_index: draft.order_index,
            starts_on: draft.starts_on,
            ends_on: draft.ends_on,
        };
        self.announcements.insert_stage(stage.clone())?;
        Ok(stage)
    }

    /// Remove one stage together with its results, atomically.
    pub fn remove_stage(&self, stage_id: &StageId) -> Result<(), AidServiceError> {
        let stage = self
            .announcements
            .fetch_stage(stage_id)?
            .ok_or_else(|| AidServiceError::not_found("stage", &stage_id.0))?;

        self.announcements
            .run_in_transaction(&mut |tx| {
                tx.delete_stage_results(&stage.id)?;
                tx.delete_stage(&stage.id)
            })
            .map_err(AidServiceError::TransactionFailure)?;
        info!(stage = %stage_id.0, "stage removed");
        Ok(())
    }

    /// Create or update the per-application result for a stage.
    pub fn record_stage_result(
        &self,
        application_id: &ApplicationId,
        stage_id: &StageId,
        status: StageResultStatus,
        observation: String,
        evaluated_on: Option<NaiveDate>,
    ) -> Result<StageResultRecord, AidServiceError> {
        self.applications
            .fetch(application_id)?
            .ok_or_else(|| AidServiceError::not_found("application", &application_id.0))?;
        self.announcements
            .fetch_stage(stage_id)?
            .ok_or_else(|| AidServiceError::not_found("stage", &stage_id.0))?;

        let existing_id = self
            .announcements
            .stage_results(stage_id)?
            .into_iter()
            .find(|result| &result.application_id == application_id)
            .map(|result| result.id);

        let record = StageResultRecord {
            id: existing_id.unwrap_or_else(next_stage_result_id),
            application_id: application_id.clone(),
            stage_id: stage_id.clone(),
            status,
            observation,
            evaluated_on,
        };
        self.announcements.upsert_stage_result(record.clone())?;
        Ok(record)
    }

    /// Cascading retraction of an announcement and everything depending on
    /// it, as one atomic unit. Dependency order is mandatory: stage results
    /// before stages, application leaves before the announcement, because
    /// the storage layer enforces referential integrity in that direction.
    ///
    /// Retracting an absent announcement is a successful no-op. Retraction
    /// is refused while any dependent application carries a benefit, since
    /// benefits are only ever removed by explicit administrative action.
    pub fn retract_announcement(
        &self,
        id: &AnnouncementId,
    ) -> Result<RetractionOutcome, AidServiceError> {
        let Some(graph) = self.announcements.fetch_graph(id)? else {
            info!(announcement = %id.0, "retraction no-op, announcement already absent");
            return Ok(RetractionOutcome::AlreadyAbsent);
        };

        for node in &graph.applications {
            if self.benefits.by_application(&node.application.id)?.is_some() {
                return Err(AidServiceError::InvalidState(format!(
                    "application {} holds a benefit; revoke it before retracting {}",
                    node.application.id.0, id.0
                )));
            }
        }

        let stage_result_count: usize = graph.stages.iter().map(|node| node.results.len()).sum();
        let document_count: usize = graph
            .applications
            .iter()
            .map(|node| node.documents.len())
            .sum();

        self.announcements
            .run_in_transaction(&mut |tx| {
                // Results first, batched per stage to bound lock scope.
                for node in &graph.stages {
                    if !node.results.is_empty() {
                        tx.delete_stage_results(&node.stage.id)?;
                    }
                }
                // Application leaves next: validations, documents, then the
                // application rows themselves.
                for node in &graph.applications {
                    tx.delete_validations(&node.application.id)?;
                    tx.delete_documents(&node.application.id)?;
                    tx.delete_application(&node.application.id)?;
                }
                tx.delete_stages(id)?;
                tx.delete_announcement(id)
            })
            .map_err(|source| {
                warn!(announcement = %id.0, error = %source, "retraction rolled back");
                AidServiceError::TransactionFailure(source)
            })?;

        info!(
            announcement = %id.0,
            stages = graph.stages.len(),
            applications = graph.applications.len(),
            "announcement retracted"
        );
        Ok(RetractionOutcome::Retracted {
            stages: graph.stages.len(),
            stage_results: stage_result_count,
            applications: graph.applications.len(),
            documents: document_count,
        })
    }
}

fn ensure_contiguous_ordering(stages: &[StageDraft]) -> Result<(), AidServiceError> {
    let mut indexes: Vec<u32> = stages.iter().map(|stage| stage.order_index).collect();
    indexes.sort_unstable();
    for (position, index) in indexes.iter().enumerate() {
        if *index != position as u32 {
            return Err(AidServiceError::Validation(format!(
                "stage ordering must be unique and contiguous from 0, got {indexes:?}"
            )));
        }
    }
    Ok(())
}
