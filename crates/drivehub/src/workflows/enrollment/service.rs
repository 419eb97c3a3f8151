use std::sync::Arc;

use super::authorization::{Action, AuthorizationGuard};
use super::checklist::Checklist;
use super::clock::{DefaultClock, SharedClock};
use super::documents::DocumentVerificationManager;
use super::domain::{
    Document, DocumentId, DocumentType, Enrollment, EnrollmentId, SchoolId, User, UserId,
};
use super::error::WorkflowError;
use super::events::EventSink;
use super::files::{FileStore, FileUpload};
use super::lifecycle::EnrollmentLifecycleManager;
use super::store::EntityStore;
use super::views::{
    newest_first, DocumentLink, EnrollmentDocuments, RosterEntry, SchoolRoster, StudentOverview,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Tunables for the workflow facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub max_upload_bytes: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Facade composing the two managers with the guarded read models.
pub struct EnrollmentWorkflow<S, F, E> {
    store: Arc<S>,
    settings: WorkflowSettings,
    guard: AuthorizationGuard,
    lifecycle: EnrollmentLifecycleManager<S, E>,
    documents: DocumentVerificationManager<S, F, E>,
}

impl<S, F, E> EnrollmentWorkflow<S, F, E>
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    pub fn new(store: Arc<S>, files: Arc<F>, events: Arc<E>, settings: WorkflowSettings) -> Self {
        Self::with_clock(store, files, events, settings, Arc::new(DefaultClock))
    }

    pub fn with_clock(
        store: Arc<S>,
        files: Arc<F>,
        events: Arc<E>,
        settings: WorkflowSettings,
        clock: SharedClock,
    ) -> Self {
        let lifecycle =
            EnrollmentLifecycleManager::new(store.clone(), events.clone(), clock.clone());
        let documents = DocumentVerificationManager::new(
            store.clone(),
            files,
            events,
            clock,
            settings.max_upload_bytes,
        );
        Self {
            store,
            settings,
            guard: AuthorizationGuard::new(),
            lifecycle,
            documents,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    pub fn lifecycle(&self) -> &EnrollmentLifecycleManager<S, E> {
        &self.lifecycle
    }

    pub fn documents(&self) -> &DocumentVerificationManager<S, F, E> {
        &self.documents
    }

    /// Look up the registered user acting on a request.
    pub fn resolve_actor(&self, actor_id: &UserId) -> Result<User, WorkflowError> {
        self.store
            .user(actor_id)?
            .ok_or_else(|| WorkflowError::not_found("user", actor_id))
    }

    pub fn enroll(
        &self,
        actor: &User,
        student_id: &UserId,
        school_id: &SchoolId,
    ) -> Result<Enrollment, WorkflowError> {
        self.lifecycle.enroll(actor, student_id, school_id)
    }

    pub fn approve_enrollment(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
        expected_version: u64,
    ) -> Result<Enrollment, WorkflowError> {
        self.lifecycle.approve(actor, enrollment_id, expected_version)
    }

    pub fn refuse_enrollment(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
        expected_version: u64,
        reason: &str,
    ) -> Result<Enrollment, WorkflowError> {
        self.lifecycle
            .refuse(actor, enrollment_id, expected_version, reason)
    }

    pub fn upload_document(
        &self,
        actor: &User,
        user_id: &UserId,
        document_type: DocumentType,
        upload: FileUpload,
    ) -> Result<Document, WorkflowError> {
        self.documents.upload(actor, user_id, document_type, upload)
    }

    pub fn accept_document(
        &self,
        actor: &User,
        document_id: &DocumentId,
        expected_version: Option<u64>,
    ) -> Result<Document, WorkflowError> {
        self.documents.accept(actor, document_id, expected_version)
    }

    pub fn refuse_document(
        &self,
        actor: &User,
        document_id: &DocumentId,
        reason: &str,
        expected_version: Option<u64>,
    ) -> Result<Document, WorkflowError> {
        self.documents
            .refuse(actor, document_id, reason, expected_version)
    }

    /// Checklist of `user_id`, visible to its owner and to managers reviewing them.
    pub fn checklist_for(
        &self,
        actor: &User,
        user_id: &UserId,
    ) -> Result<Checklist, WorkflowError> {
        let snapshot = self.store.student_snapshot(user_id)?;
        self.guard.require(
            self.guard
                .can_view_checklist(actor, user_id, &snapshot.enrollments),
            actor,
            Action::ViewChecklist,
        )?;
        Ok(Checklist::from_documents(&snapshot.documents))
    }

    /// The student's checklist joined onto one enrollment, for the school's manager.
    pub fn enrollment_documents(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
    ) -> Result<EnrollmentDocuments, WorkflowError> {
        let enrollment = self
            .store
            .enrollment(enrollment_id)?
            .ok_or_else(|| WorkflowError::not_found("enrollment", enrollment_id))?;
        self.guard.require(
            self.guard.can_act_on_enrollment(actor, &enrollment),
            actor,
            Action::ReviewDocument,
        )?;

        let checklist = self.documents.checklist(&enrollment.student_id)?;
        Ok(EnrollmentDocuments {
            enrollment_id: enrollment.id,
            student_id: enrollment.student_id,
            status: enrollment.status,
            version: enrollment.version,
            checklist,
        })
    }

    pub fn student_overview(
        &self,
        actor: &User,
        student_id: &UserId,
    ) -> Result<StudentOverview, WorkflowError> {
        self.guard.require(
            self.guard.can_view_enrollments(actor, student_id),
            actor,
            Action::ViewOwnEnrollments,
        )?;
        let snapshot = self.store.student_snapshot(student_id)?;
        Ok(StudentOverview::from_snapshot(&snapshot))
    }

    /// Every enrollment at the manager's school, newest first.
    pub fn school_enrollments(&self, actor: &User) -> Result<SchoolRoster, WorkflowError> {
        self.guard.require(
            self.guard.can_view_roster(actor),
            actor,
            Action::ViewSchoolRoster,
        )?;
        let Some(school_id) = actor.school_id.clone() else {
            return Err(WorkflowError::Forbidden {
                actor: actor.id.clone(),
                action: Action::ViewSchoolRoster,
            });
        };

        let enrollments = newest_first(self.store.school_enrollments(&school_id)?)
            .into_iter()
            .map(|enrollment| {
                let checklist = self.documents.checklist(&enrollment.student_id)?;
                Ok(RosterEntry::new(enrollment, checklist))
            })
            .collect::<Result<Vec<_>, WorkflowError>>()?;

        Ok(SchoolRoster {
            school_id,
            enrollments,
        })
    }

    /// Resolve a document's stored file for its owner or a reviewing manager.
    pub fn document_url(
        &self,
        actor: &User,
        document_id: &DocumentId,
    ) -> Result<DocumentLink, WorkflowError> {
        let document = self
            .store
            .document(document_id)?
            .ok_or_else(|| WorkflowError::not_found("document", document_id))?;
        let snapshot = self.store.student_snapshot(&document.owner_id)?;
        self.guard.require(
            self.guard
                .can_view_checklist(actor, &document.owner_id, &snapshot.enrollments),
            actor,
            Action::ViewChecklist,
        )?;

        let url = self.documents.file_url(&document)?;
        Ok(DocumentLink {
            document_id: document.id,
            url,
        })
    }

    pub fn recompute_status(&self, student_id: &UserId) -> Result<Vec<Enrollment>, WorkflowError> {
        self.lifecycle.recompute_status(student_id)
    }
}
