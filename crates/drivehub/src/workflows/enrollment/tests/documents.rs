use std::sync::Arc;

use super::common::*;
use crate::workflows::enrollment::{
    ChecklistStatus, DocumentStatus, DocumentType, EnrollmentStatus, EnrollmentWorkflow,
    EntityStore, FileUpload, InMemoryEntityStore, UserId, WorkflowError, WorkflowEvent,
    WorkflowSettings,
};

#[test]
fn upload_creates_pending_row_with_file_metadata() {
    let harness = build_harness();
    let document = upload(&harness.workflow, &student(), DocumentType::IdCard);

    assert_eq!(document.status, DocumentStatus::Pending);
    assert_eq!(document.version, 1);
    assert_eq!(document.file_name, "id_card.png");
    assert_eq!(document.content_type, "image/png");
    assert_eq!(document.file_size, 7);
    assert!(document.file_ref.0.starts_with("documents/id_card/"));
    assert_eq!(harness.files.stored(), 1);
}

#[test]
fn upload_is_self_service_only() {
    let harness = build_harness();
    match harness.workflow.upload_document(
        &manager_w(),
        &student().id,
        DocumentType::IdCard,
        scan("id.png"),
    ) {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
    assert_eq!(harness.files.stored(), 0);
}

#[test]
fn upload_validates_before_touching_the_file_store() {
    let harness = build_harness();
    let empty = FileUpload::new("id.png", mime::IMAGE_PNG, Vec::new());
    let oversized = FileUpload::new("id.png", mime::IMAGE_PNG, vec![0; 2048]);
    let unnamed = FileUpload::new("  ", mime::IMAGE_PNG, vec![1]);

    for upload in [empty, oversized, unnamed] {
        match harness.workflow.upload_document(
            &student(),
            &student().id,
            DocumentType::IdCard,
            upload,
        ) {
            Err(WorkflowError::Validation(_)) => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }
    assert_eq!(harness.files.stored(), 0);
}

#[test]
fn failed_file_store_leaves_no_document_row() {
    let store = Arc::new(InMemoryEntityStore::new());
    seed(&store);
    let workflow = EnrollmentWorkflow::new(
        store.clone(),
        Arc::new(UnavailableFiles),
        Arc::new(MemoryEvents::default()),
        WorkflowSettings::default(),
    );

    match workflow.upload_document(&student(), &student().id, DocumentType::IdCard, scan("id.png"))
    {
        Err(WorkflowError::FileStore(_)) => {}
        other => panic!("expected file store failure, got {other:?}"),
    }
    let snapshot = store.student_snapshot(&student().id).expect("snapshot");
    assert!(snapshot.documents.is_empty());
    assert_eq!(snapshot.revision, 0);
}

#[test]
fn reupload_of_refused_document_resets_it_and_resubmits() {
    let harness = build_harness();
    let enrollment = harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let documents = upload_all(&harness.workflow, &student());
    let id_card = &documents[1];
    assert_eq!(id_card.document_type, DocumentType::IdCard);

    let refused = harness
        .workflow
        .refuse_document(&manager_w(), &id_card.id, "photo illegible", None)
        .expect("refuse id card");
    assert_eq!(refused.status, DocumentStatus::Refused);
    assert_eq!(refused.refusal_reason.as_deref(), Some("photo illegible"));
    assert_eq!(refused.reviewed_by, Some(UserId::from("mgr-w")));
    assert_eq!(
        stored_enrollment(&harness.store, &enrollment.id).status,
        EnrollmentStatus::PendingDocuments
    );

    let replaced = upload(&harness.workflow, &student(), DocumentType::IdCard);
    assert_eq!(replaced.id, id_card.id);
    assert_eq!(replaced.status, DocumentStatus::Pending);
    assert!(replaced.refusal_reason.is_none());
    assert!(replaced.reviewed_by.is_none());
    assert_eq!(replaced.version, refused.version + 1);
    assert_eq!(
        stored_enrollment(&harness.store, &enrollment.id).status,
        EnrollmentStatus::PendingApproval
    );
}

#[test]
fn accept_and_refuse_follow_document_transitions() {
    let harness = build_harness();
    harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let photo = upload(&harness.workflow, &student(), DocumentType::ProfilePhoto);

    let accepted = harness
        .workflow
        .accept_document(&manager_w(), &photo.id, Some(photo.version))
        .expect("accept pending");
    assert_eq!(accepted.status, DocumentStatus::Accepted);
    assert!(accepted.reviewed_at.is_some());

    match harness
        .workflow
        .accept_document(&manager_w(), &photo.id, None)
    {
        Err(WorkflowError::InvalidStateTransition { entity, from, .. }) => {
            assert_eq!(entity, "document");
            assert_eq!(from, "accepted");
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let refused = harness
        .workflow
        .refuse_document(&manager_w(), &photo.id, "face not visible", None)
        .expect("refuse accepted document");
    match harness
        .workflow
        .refuse_document(&manager_w(), &photo.id, "again", None)
    {
        Err(WorkflowError::InvalidStateTransition { from, .. }) => assert_eq!(from, "refused"),
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let reaccepted = harness
        .workflow
        .accept_document(&manager_w(), &photo.id, Some(refused.version))
        .expect("accept refused document");
    assert!(reaccepted.refusal_reason.is_none());
}

#[test]
fn document_refusal_requires_reason_and_changes_nothing_otherwise() {
    let harness = build_harness();
    harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let photo = upload(&harness.workflow, &student(), DocumentType::ProfilePhoto);

    match harness
        .workflow
        .refuse_document(&manager_w(), &photo.id, "", None)
    {
        Err(WorkflowError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(stored_document(&harness.store, &photo.id), photo);
}

#[test]
fn review_requires_managing_an_active_enrollment_of_the_owner() {
    let harness = build_harness();
    let enrollment = harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let documents = upload_all(&harness.workflow, &student());

    match harness
        .workflow
        .accept_document(&manager_n(), &documents[0].id, None)
    {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    let submitted = stored_enrollment(&harness.store, &enrollment.id);
    harness
        .workflow
        .refuse_enrollment(&manager_w(), &enrollment.id, submitted.version, "duplicate file")
        .expect("reject enrollment");
    match harness
        .workflow
        .accept_document(&manager_w(), &documents[0].id, None)
    {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden after rejection, got {other:?}"),
    }
}

#[test]
fn stale_document_version_conflicts() {
    let harness = build_harness();
    harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let photo = upload(&harness.workflow, &student(), DocumentType::ProfilePhoto);
    upload(&harness.workflow, &student(), DocumentType::ProfilePhoto);

    match harness
        .workflow
        .accept_document(&manager_w(), &photo.id, Some(photo.version))
    {
        Err(WorkflowError::Conflict { entity, .. }) => assert_eq!(entity, "document"),
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[test]
fn refusal_never_rolls_back_an_approved_enrollment() {
    let harness = build_harness();
    let enrollment = harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let documents = upload_all(&harness.workflow, &student());
    let submitted = stored_enrollment(&harness.store, &enrollment.id);
    let approved = harness
        .workflow
        .approve_enrollment(&manager_w(), &enrollment.id, submitted.version)
        .expect("approve");

    harness
        .workflow
        .refuse_document(&manager_w(), &documents[2].id, "expired", None)
        .expect("refuse after approval");
    assert_eq!(stored_enrollment(&harness.store, &enrollment.id), approved);
}

#[test]
fn refusal_returns_every_pending_approval_enrollment_of_the_student() {
    let harness = build_harness();
    let west = harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll w");
    let documents = upload_all(&harness.workflow, &student());
    let north = harness
        .workflow
        .enroll(&student(), &student().id, &school_n())
        .expect("enroll n");
    assert_eq!(north.status, EnrollmentStatus::PendingApproval);
    harness.events.clear();

    harness
        .workflow
        .refuse_document(&manager_n(), &documents[3].id, "wrong address", None)
        .expect("refuse residence");

    for id in [&west.id, &north.id] {
        assert_eq!(
            stored_enrollment(&harness.store, id).status,
            EnrollmentStatus::PendingDocuments
        );
    }
    let events = harness.events.events();
    assert!(matches!(events[0], WorkflowEvent::DocumentRefused { .. }));
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, WorkflowEvent::EnrollmentReturnedToDocuments { .. }))
            .count(),
        2
    );
}

#[test]
fn checklist_visibility_is_owner_or_reviewing_manager() {
    let harness = build_harness();
    harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    upload(&harness.workflow, &student(), DocumentType::IdCard);

    let checklist = harness
        .workflow
        .checklist_for(&manager_w(), &student().id)
        .expect("manager reads checklist");
    assert_eq!(
        checklist.entry(DocumentType::IdCard).map(|entry| entry.status),
        Some(ChecklistStatus::Pending)
    );
    assert_eq!(
        checklist
            .entry(DocumentType::ProfilePhoto)
            .map(|entry| entry.status),
        Some(ChecklistStatus::NotUploaded)
    );

    for outsider in [manager_n(), other_student()] {
        match harness.workflow.checklist_for(&outsider, &student().id) {
            Err(WorkflowError::Forbidden { .. }) => {}
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}

#[test]
fn document_url_resolves_through_file_store() {
    let harness = build_harness();
    let photo = upload(&harness.workflow, &student(), DocumentType::ProfilePhoto);
    let link = harness
        .workflow
        .document_url(&student(), &photo.id)
        .expect("owner resolves url");
    assert_eq!(link.url, format!("memory://{}", photo.file_ref));
}

#[test]
fn roster_and_overview_reflect_progress() {
    let harness = build_harness();
    let enrollment = harness
        .workflow
        .enroll(&student(), &student().id, &school_w())
        .expect("enroll");
    let documents = upload_all(&harness.workflow, &student());
    for document in &documents {
        harness
            .workflow
            .accept_document(&manager_w(), &document.id, None)
            .expect("accept");
    }

    let roster = harness
        .workflow
        .school_enrollments(&manager_w())
        .expect("roster");
    assert_eq!(roster.school_id, school_w());
    assert_eq!(roster.enrollments.len(), 1);
    assert!(roster.enrollments[0].documents_verified);

    let review = harness
        .workflow
        .enrollment_documents(&manager_w(), &enrollment.id)
        .expect("review documents");
    assert!(review.checklist.is_fully_accepted());
    match harness
        .workflow
        .enrollment_documents(&manager_n(), &enrollment.id)
    {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }

    let overview = harness
        .workflow
        .student_overview(&student(), &student().id)
        .expect("overview");
    assert_eq!(overview.enrollments[0].documents.total_accepted, 4);
    match harness
        .workflow
        .student_overview(&manager_w(), &student().id)
    {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
    match harness.workflow.school_enrollments(&student()) {
        Err(WorkflowError::Forbidden { .. }) => {}
        other => panic!("expected forbidden, got {other:?}"),
    }
}
