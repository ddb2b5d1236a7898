use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use clap::Args;

use amparo::error::AppError;
use amparo::workflows::aid::{
    AnnouncementDraft, AnnouncementManager, AnnouncementPatch, AnnouncementStatus,
    ApplicationManager, ApplicationPatch, ApplicationStatus, BenefitActivator, BlobStore,
    DocumentKind, DocumentValidationTracker, ReviewerId, StageDraft, StageResultStatus,
    ValidationDecision,
};

use crate::infra::{InMemoryAidStore, InMemoryBlobStore};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Application submission date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) submitted_on: Option<NaiveDate>,
}

fn blob_error(err: amparo::workflows::aid::BlobStoreError) -> AppError {
    AppError::Io(std::io::Error::other(err.to_string()))
}

/// One announcement cycle end to end, narrated on stdout: publication,
/// application, document rounds, stage evaluation, reconciliation.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let submitted_on = args
        .submitted_on
        .unwrap_or_else(|| Local::now().date_naive());

    let store = Arc::new(InMemoryAidStore::default());
    store.seed_student("stu-000001", "Ana Beatriz Lima", "20260001");
    let blobs = InMemoryBlobStore::default();

    let announcements = AnnouncementManager::new(store.clone(), store.clone(), store.clone());
    let applications =
        ApplicationManager::new(store.clone(), store.clone(), store.clone(), store.clone());
    let documents = DocumentValidationTracker::new(store.clone(), store.clone(), store.clone());
    let benefits = BenefitActivator::new(store.clone(), store.clone(), store.clone());

    let student = amparo::workflows::aid::StudentId("stu-000001".to_string());
    let reviewer = ReviewerId("rev-000001".to_string());

    println!("Aid benefit engine demo");

    let announcement = announcements.create_announcement(AnnouncementDraft {
        title: "Auxilio Moradia 2026".to_string(),
        description: "Housing aid for enrolled students".to_string(),
        category_tags: vec!["MORADIA".to_string()],
        required_documents: vec![
            DocumentKind("RG".to_string()),
            DocumentKind("COMPROVANTE_RENDA".to_string()),
        ],
        status: AnnouncementStatus::Active,
        total_openings: 40,
        stages: vec![
            StageDraft {
                name: "Analise documental".to_string(),
                order_index: 0,
                starts_on: submitted_on,
                ends_on: submitted_on + Duration::days(10),
            },
            StageDraft {
                name: "Entrevista".to_string(),
                order_index: 1,
                starts_on: submitted_on + Duration::days(11),
                ends_on: submitted_on + Duration::days(20),
            },
        ],
    })?;
    println!(
        "Published announcement {} '{}' with {} openings",
        announcement.id.0, announcement.title, announcement.total_openings
    );

    let application =
        applications.create_application(&student, &announcement.id, &[], submitted_on)?;
    println!(
        "Student {} applied: application {} ({})",
        student.0,
        application.id.0,
        application.status.label()
    );

    let rg_handle = blobs
        .put(b"rg scan, first attempt".to_vec())
        .map_err(blob_error)?;
    let rg = documents.submit_document(&application.id, DocumentKind("RG".to_string()), rg_handle)?;
    let income_handle = blobs
        .put(b"payslip scan".to_vec())
        .map_err(blob_error)?;
    let income = documents.submit_document(
        &application.id,
        DocumentKind("COMPROVANTE_RENDA".to_string()),
        income_handle,
    )?;
    println!("Submitted documents {} and {}", rg.id.0, income.id.0);

    documents.record_validation(
        &rg.id,
        ValidationDecision::Rejected,
        reviewer.clone(),
        "illegible scan".to_string(),
        submitted_on + Duration::days(1),
    )?;
    documents.record_validation(
        &income.id,
        ValidationDecision::Approved,
        reviewer.clone(),
        "income within threshold".to_string(),
        submitted_on + Duration::days(1),
    )?;
    println!(
        "First review round: RG rejected, income proof approved (rejected flag: {})",
        documents.has_any_rejected(&student)?
    );

    let retry_handle = blobs
        .put(b"rg scan, second attempt".to_vec())
        .map_err(blob_error)?;
    let rg_retry =
        documents.submit_document(&application.id, DocumentKind("RG".to_string()), retry_handle)?;
    documents.record_validation(
        &rg_retry.id,
        ValidationDecision::Approved,
        reviewer,
        "legible and current".to_string(),
        submitted_on + Duration::days(3),
    )?;
    println!(
        "Resubmitted RG as {} and approved it (rejected flag: {})",
        rg_retry.id.0,
        documents.has_any_rejected(&student)?
    );

    for stage in announcements.stages(&announcement.id)? {
        let result = announcements.record_stage_result(
            &application.id,
            &stage.id,
            StageResultStatus::Finished,
            "cleared".to_string(),
            Some(submitted_on + Duration::days(19)),
        )?;
        println!(
            "Stage '{}' finished for {} (result {})",
            stage.name, application.id.0, result.id.0
        );
    }

    let approved = applications.update_application(
        &application.id,
        ApplicationPatch {
            status: Some(ApplicationStatus::Approved),
            ..ApplicationPatch::default()
        },
    )?;
    println!("Application decided: {}", approved.status.label());

    announcements.update_announcement(
        &announcement.id,
        AnnouncementPatch {
            status: Some(AnnouncementStatus::Closed),
            ..AnnouncementPatch::default()
        },
    )?;
    let created = benefits.reconcile(&announcement.id, submitted_on + Duration::days(30))?;
    println!(
        "Announcement closed and reconciled: {} benefit(s) activated",
        created.len()
    );

    for view in benefits.list_active_benefits(&student)? {
        println!(
            "Active benefit {} for '{}' starting {}",
            view.benefit_id.0, view.announcement_title, view.starts_on
        );
    }

    Ok(())
}
