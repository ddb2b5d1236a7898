use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier wrapper for published announcements (editais).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnouncementId(pub String);

/// Identifier wrapper for an announcement's evaluation stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageId(pub String);

/// Identifier wrapper for per-application stage results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageResultId(pub String);

/// Identifier wrapper for submitted applications (inscricoes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for supporting documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Identifier wrapper for append-only validation records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationId(pub String);

/// Identifier wrapper for students.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for staff reviewers recording validation decisions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

/// Identifier wrapper for materialized benefits (beneficios).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenefitId(pub String);

/// Announcement-declared document kind, e.g. "RG" or "COMPROVANTE_RENDA".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentKind(pub String);

/// Opaque handle returned by the blob store; the engine never reads contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobHandle(pub String);

/// Lifecycle status of an announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnouncementStatus {
    #[serde(rename = "ATIVO")]
    Active,
    #[serde(rename = "DESATIVADO")]
    Closed,
    #[serde(rename = "EM_ANALISE")]
    UnderReview,
}

impl AnnouncementStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AnnouncementStatus::Active => "ATIVO",
            AnnouncementStatus::Closed => "DESATIVADO",
            AnnouncementStatus::UnderReview => "EM_ANALISE",
        }
    }
}

/// Status machine for an application. `Approved` and `Denied` are terminal;
/// a reopened case must be created anew so the validation history stays intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[serde(rename = "PENDENTE")]
    Pending,
    #[serde(rename = "APROVADA")]
    Approved,
    #[serde(rename = "NEGADA")]
    Denied,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "PENDENTE",
            ApplicationStatus::Approved => "APROVADA",
            ApplicationStatus::Denied => "NEGADA",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Denied
        )
    }
}

/// Per-round document status. A rejected document reopens submission for its
/// kind; the resubmitted file starts a fresh round at `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    #[serde(rename = "PENDENTE")]
    Pending,
    #[serde(rename = "EM_ANALISE")]
    UnderReview,
    #[serde(rename = "APROVADO")]
    Approved,
    #[serde(rename = "REPROVADO")]
    Rejected,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "PENDENTE",
            DocumentStatus::UnderReview => "EM_ANALISE",
            DocumentStatus::Approved => "APROVADO",
            DocumentStatus::Rejected => "REPROVADO",
        }
    }

    pub const fn is_decided(self) -> bool {
        matches!(self, DocumentStatus::Approved | DocumentStatus::Rejected)
    }
}

/// Reviewer decision applied to a document. Each decision appends one
/// immutable validation record; prior records are never erased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationDecision {
    #[serde(rename = "APROVADO")]
    Approved,
    #[serde(rename = "REPROVADO")]
    Rejected,
    #[serde(rename = "EM_ANALISE")]
    UnderReview,
}

impl ValidationDecision {
    pub const fn document_status(self) -> DocumentStatus {
        match self {
            ValidationDecision::Approved => DocumentStatus::Approved,
            ValidationDecision::Rejected => DocumentStatus::Rejected,
            ValidationDecision::UnderReview => DocumentStatus::UnderReview,
        }
    }
}

/// Completion status of one application's result in one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageResultStatus {
    #[serde(rename = "NAO_INICIADA")]
    NotStarted,
    #[serde(rename = "EM_ANALISE")]
    UnderReview,
    #[serde(rename = "FINALIZADA")]
    Finished,
}

impl StageResultStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StageResultStatus::NotStarted => "NAO_INICIADA",
            StageResultStatus::UnderReview => "EM_ANALISE",
            StageResultStatus::Finished => "FINALIZADA",
        }
    }
}

/// Lifecycle of a materialized benefit. Created only by reconciliation;
/// suspended or ended only by explicit administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenefitStatus {
    #[serde(rename = "ATIVO")]
    Active,
    #[serde(rename = "SUSPENSO")]
    Suspended,
    #[serde(rename = "ENCERRADO")]
    Ended,
}

impl BenefitStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BenefitStatus::Active => "ATIVO",
            BenefitStatus::Suspended => "SUSPENSO",
            BenefitStatus::Ended => "ENCERRADO",
        }
    }
}

/// Student row; students outlive their applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub full_name: String,
    pub registration: String,
}

/// Caller-supplied shape for a new announcement and its stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementDraft {
    pub title: String,
    pub description: String,
    pub category_tags: Vec<String>,
    pub required_documents: Vec<DocumentKind>,
    pub status: AnnouncementStatus,
    pub total_openings: u32,
    pub stages: Vec<StageDraft>,
}

/// Caller-supplied shape for one evaluation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDraft {
    pub name: String,
    pub order_index: u32,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

/// Stored announcement row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub id: AnnouncementId,
    pub title: String,
    pub description: String,
    pub category_tags: Vec<String>,
    pub required_documents: Vec<DocumentKind>,
    pub status: AnnouncementStatus,
    pub total_openings: u32,
}

/// Stored stage row; a stage never outlives its announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: StageId,
    pub announcement_id: AnnouncementId,
    pub name: String,
    pub order_index: u32,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

/// Leaf row tying one application to one stage's evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResultRecord {
    pub id: StageResultId,
    pub application_id: ApplicationId,
    pub stage_id: StageId,
    pub status: StageResultStatus,
    pub observation: String,
    pub evaluated_on: Option<NaiveDate>,
}

/// Stored application row referencing exactly one student and announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub student_id: StudentId,
    pub announcement_id: AnnouncementId,
    pub submitted_on: NaiveDate,
    pub status: ApplicationStatus,
}

/// Stored document row; the engine holds only the blob handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub application_id: ApplicationId,
    pub kind: DocumentKind,
    pub blob_handle: BlobHandle,
    pub status: DocumentStatus,
}

/// Append-only audit entry for one reviewer decision. Never mutated after
/// creation; a correction appends a further record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub id: ValidationId,
    pub document_id: DocumentId,
    pub reviewer_id: ReviewerId,
    pub decision: ValidationDecision,
    pub opinion: String,
    pub decided_on: NaiveDate,
}

/// Stored benefit row; at most one per application, ever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitRecord {
    pub id: BenefitId,
    pub application_id: ApplicationId,
    pub starts_on: NaiveDate,
    pub status: BenefitStatus,
}

/// One stage together with its results, as loaded for retraction.
#[derive(Debug, Clone)]
pub struct StageNode {
    pub stage: StageRecord,
    pub results: Vec<StageResultRecord>,
}

/// One dependent application together with its documents, as loaded for
/// retraction.
#[derive(Debug, Clone)]
pub struct ApplicationNode {
    pub application: ApplicationRecord,
    pub documents: Vec<DocumentRecord>,
}

/// Full dependency graph of an announcement, loaded in one read so the
/// retraction cascade works against a consistent snapshot.
#[derive(Debug, Clone)]
pub struct AnnouncementGraph {
    pub announcement: AnnouncementRecord,
    pub stages: Vec<StageNode>,
    pub applications: Vec<ApplicationNode>,
}
