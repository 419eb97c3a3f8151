use crate::infra::{
    guessed_upload, seed_directory, InMemoryEventSink, InMemoryFileStore, DEMO_STUDENT,
    NORTH_MANAGER, WEST_MANAGER, WEST_SCHOOL,
};
use chrono::SecondsFormat;
use clap::Args;
use drivehub::error::AppError;
use drivehub::workflows::enrollment::{
    Checklist, Document, DocumentType, EnrollmentId, EnrollmentWorkflow, EntityStore, FileStore,
    InMemoryEntityStore, LocalFileStore, SchoolId, UserId, WorkflowError, WorkflowSettings,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Write uploaded files below this directory instead of keeping them in memory.
    #[arg(long)]
    pub(crate) uploads_dir: Option<PathBuf>,
    /// Print every workflow event emitted along the way.
    #[arg(long)]
    pub(crate) show_events: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    match args.uploads_dir {
        Some(root) => {
            std::fs::create_dir_all(&root)?;
            let files = LocalFileStore::new(root, "http://127.0.0.1:3000/uploads/");
            walkthrough(Arc::new(files), args.show_events)
        }
        None => walkthrough(Arc::new(InMemoryFileStore::default()), args.show_events),
    }
}

type DemoWorkflow<F> = EnrollmentWorkflow<InMemoryEntityStore, F, InMemoryEventSink>;

fn walkthrough<F: FileStore + 'static>(files: Arc<F>, show_events: bool) -> Result<(), AppError> {
    let store = Arc::new(InMemoryEntityStore::new());
    seed_directory(store.as_ref()).map_err(WorkflowError::from)?;
    let events = Arc::new(InMemoryEventSink::default());
    let workflow = EnrollmentWorkflow::new(
        store.clone(),
        files,
        events.clone(),
        WorkflowSettings::default(),
    );

    let student = workflow.resolve_actor(&UserId::from(DEMO_STUDENT))?;
    let west_manager = workflow.resolve_actor(&UserId::from(WEST_MANAGER))?;
    let north_manager = workflow.resolve_actor(&UserId::from(NORTH_MANAGER))?;

    println!("Driving-school enrollment demo");
    let enrollment = workflow.enroll(&student, &student.id, &SchoolId::from(WEST_SCHOOL))?;
    println!(
        "1. {} enrolled with {} -> {} (v{})",
        student.id, enrollment.school_id, enrollment.status, enrollment.version
    );

    for (document_type, file_name) in [
        (DocumentType::ProfilePhoto, "portrait.jpg"),
        (DocumentType::IdCard, "id-card.pdf"),
    ] {
        upload(&workflow, &student.id, document_type, file_name)?;
    }
    println!("2. Uploaded two of four documents");
    print_checklist(&workflow.checklist_for(&student, &student.id)?);
    print_status(&workflow, &enrollment.id)?;

    for (document_type, file_name) in [
        (DocumentType::MedicalCertificate, "medical.pdf"),
        (DocumentType::ResidenceCertificate, "residence.png"),
    ] {
        upload(&workflow, &student.id, document_type, file_name)?;
    }
    println!("3. Uploaded the remaining documents");
    print_status(&workflow, &enrollment.id)?;

    let current = current_version(&workflow, &enrollment.id)?;
    match workflow.approve_enrollment(&north_manager, &enrollment.id, current) {
        Err(err) => println!("4. {} tried to approve: {err}", north_manager.id),
        Ok(_) => println!("4. unexpected: another school's manager approved"),
    }

    let review = workflow.enrollment_documents(&west_manager, &enrollment.id)?;
    let id_card = review
        .checklist
        .entry(DocumentType::IdCard)
        .and_then(|entry| entry.document_id.clone());
    if let Some(document_id) = id_card {
        let refused =
            workflow.refuse_document(&west_manager, &document_id, "photo illegible", None)?;
        println!(
            "5. {} refused {} ({})",
            west_manager.id,
            refused.document_type,
            refused.refusal_reason.as_deref().unwrap_or_default()
        );
        print_status(&workflow, &enrollment.id)?;
    }

    let replacement = upload(&workflow, &student.id, DocumentType::IdCard, "id-card-retake.jpg")?;
    println!(
        "6. Re-uploaded {} as {}",
        replacement.document_type, replacement.file_name
    );
    print_status(&workflow, &enrollment.id)?;

    let current = current_version(&workflow, &enrollment.id)?;
    let approved = workflow.approve_enrollment(&west_manager, &enrollment.id, current)?;
    println!(
        "7. {} approved the enrollment at {}",
        west_manager.id,
        approved
            .approved_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default()
    );
    if let Err(err) = workflow.approve_enrollment(&west_manager, &enrollment.id, approved.version)
    {
        println!("   Approving twice: {err}");
    }

    let roster = workflow.school_enrollments(&west_manager)?;
    println!("\nRoster for {}", roster.school_id);
    for entry in &roster.enrollments {
        println!(
            "  {} {} {} documents verified: {}",
            entry.enrollment.id,
            entry.enrollment.student_id,
            entry.enrollment.status,
            entry.documents_verified
        );
    }

    let emitted = events.drain();
    println!("\nWorkflow events emitted: {}", emitted.len());
    if show_events {
        for event in emitted {
            match serde_json::to_string(&event) {
                Ok(json) => println!("  {json}"),
                Err(err) => println!("  {} (unserializable: {err})", event.name()),
            }
        }
    }

    Ok(())
}

fn upload<F: FileStore + 'static>(
    workflow: &DemoWorkflow<F>,
    owner: &UserId,
    document_type: DocumentType,
    file_name: &str,
) -> Result<Document, WorkflowError> {
    let actor = workflow.resolve_actor(owner)?;
    let bytes = format!("demo scan of {document_type}").into_bytes();
    workflow.upload_document(&actor, owner, document_type, guessed_upload(file_name, bytes))
}

fn current_version<F: FileStore + 'static>(
    workflow: &DemoWorkflow<F>,
    enrollment_id: &EnrollmentId,
) -> Result<u64, WorkflowError> {
    workflow
        .store()
        .enrollment(enrollment_id)?
        .map(|enrollment| enrollment.version)
        .ok_or_else(|| WorkflowError::NotFound {
            entity: "enrollment",
            id: enrollment_id.to_string(),
        })
}

fn print_status<F: FileStore + 'static>(
    workflow: &DemoWorkflow<F>,
    enrollment_id: &EnrollmentId,
) -> Result<(), WorkflowError> {
    if let Some(enrollment) = workflow.store().enrollment(enrollment_id)? {
        println!(
            "   Enrollment {} is {} (v{})",
            enrollment.id, enrollment.status, enrollment.version
        );
    }
    Ok(())
}

fn print_checklist(checklist: &Checklist) {
    for (document_type, entry) in checklist.entries() {
        println!("   - {:<22} {:?}", document_type.title(), entry.status);
    }
}
