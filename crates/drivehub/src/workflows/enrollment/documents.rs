use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::authorization::{Action, AuthorizationGuard};
use super::checklist::Checklist;
use super::clock::SharedClock;
use super::domain::{Document, DocumentId, DocumentStatus, DocumentType, User, UserId};
use super::error::WorkflowError;
use super::events::{self, EventSink, WorkflowEvent};
use super::files::{FileStore, FileUpload};
use super::lifecycle::{commit_unit, required_reason, stage_recompute};
use super::store::{EntityStore, StudentSnapshot, UnitOfWork};

static DOCUMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_document_id() -> DocumentId {
    let id = DOCUMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DocumentId(format!("doc-{id:06}"))
}

/// Owns uploads, manager reviews and the required-document checklist.
pub struct DocumentVerificationManager<S, F, E> {
    store: Arc<S>,
    files: Arc<F>,
    events: Arc<E>,
    clock: SharedClock,
    guard: AuthorizationGuard,
    max_upload_bytes: usize,
}

impl<S, F, E> DocumentVerificationManager<S, F, E>
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        files: Arc<F>,
        events: Arc<E>,
        clock: SharedClock,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            store,
            files,
            events,
            clock,
            guard: AuthorizationGuard::new(),
            max_upload_bytes,
        }
    }

    /// Store the file, then create or replace the `(user_id, document_type)` row as pending.
    ///
    /// The file store runs before the unit of work opens; if it fails no row is written.
    pub fn upload(
        &self,
        actor: &User,
        user_id: &UserId,
        document_type: DocumentType,
        upload: FileUpload,
    ) -> Result<Document, WorkflowError> {
        self.guard.require(
            self.guard.can_upload(actor, user_id),
            actor,
            Action::UploadDocument,
        )?;
        self.validate_upload(&upload)?;

        let folder = format!("documents/{document_type}");
        let file_ref = self.files.store(&folder, &upload)?;

        let snapshot = self.store.student_snapshot(user_id)?;
        let now = self.clock.utc();
        let document = match snapshot.document(document_type) {
            Some(existing) => Document {
                status: DocumentStatus::Pending,
                file_ref,
                file_name: upload.file_name.trim().to_string(),
                content_type: upload.content_type.to_string(),
                file_size: upload.size(),
                upload_date: now,
                refusal_reason: None,
                reviewed_by: None,
                reviewed_at: None,
                version: existing.version + 1,
                ..existing.clone()
            },
            None => Document {
                id: next_document_id(),
                owner_id: user_id.clone(),
                document_type,
                status: DocumentStatus::Pending,
                file_ref,
                file_name: upload.file_name.trim().to_string(),
                content_type: upload.content_type.to_string(),
                file_size: upload.size(),
                upload_date: now,
                refusal_reason: None,
                reviewed_by: None,
                reviewed_at: None,
                version: 1,
            },
        };

        let stored = self
            .commit_with_recompute(&snapshot, document, Vec::new())
            .map_err(|err| {
                warn!(
                    %user_id,
                    %document_type,
                    error = %err,
                    "document row not written; stored file is orphaned"
                );
                err
            })?;
        info!(
            document_id = %stored.id,
            %user_id,
            %document_type,
            size = stored.file_size,
            "document uploaded"
        );
        Ok(stored)
    }

    /// Accept a pending or previously refused document.
    pub fn accept(
        &self,
        actor: &User,
        document_id: &DocumentId,
        expected_version: Option<u64>,
    ) -> Result<Document, WorkflowError> {
        let (snapshot, current) = self.load_for_review(actor, document_id, expected_version)?;
        if !matches!(
            current.status,
            DocumentStatus::Pending | DocumentStatus::Refused
        ) {
            return Err(invalid_transition(current.status, "accept"));
        }

        let now = self.clock.utc();
        let accepted = Document {
            status: DocumentStatus::Accepted,
            refusal_reason: None,
            reviewed_by: Some(actor.id.clone()),
            reviewed_at: Some(now),
            version: current.version + 1,
            ..current
        };
        let event = WorkflowEvent::DocumentAccepted {
            document_id: accepted.id.clone(),
            owner_id: accepted.owner_id.clone(),
            document_type: accepted.document_type,
            reviewed_by: actor.id.clone(),
        };

        let stored = self.commit_with_recompute(&snapshot, accepted, vec![event])?;
        info!(document_id = %stored.id, manager = %actor.id, "document accepted");
        Ok(stored)
    }

    /// Refuse a pending or previously accepted document.
    pub fn refuse(
        &self,
        actor: &User,
        document_id: &DocumentId,
        reason: &str,
        expected_version: Option<u64>,
    ) -> Result<Document, WorkflowError> {
        let reason = required_reason(reason)?;
        let (snapshot, current) = self.load_for_review(actor, document_id, expected_version)?;
        if !matches!(
            current.status,
            DocumentStatus::Pending | DocumentStatus::Accepted
        ) {
            return Err(invalid_transition(current.status, "refuse"));
        }

        let now = self.clock.utc();
        let refused = Document {
            status: DocumentStatus::Refused,
            refusal_reason: Some(reason.clone()),
            reviewed_by: Some(actor.id.clone()),
            reviewed_at: Some(now),
            version: current.version + 1,
            ..current
        };
        let event = WorkflowEvent::DocumentRefused {
            document_id: refused.id.clone(),
            owner_id: refused.owner_id.clone(),
            document_type: refused.document_type,
            reviewed_by: actor.id.clone(),
            reason,
        };

        let stored = self.commit_with_recompute(&snapshot, refused, vec![event])?;
        info!(document_id = %stored.id, manager = %actor.id, "document refused");
        Ok(stored)
    }

    /// Read-only projection of the four required types for `user_id`.
    pub fn checklist(&self, user_id: &UserId) -> Result<Checklist, WorkflowError> {
        let snapshot = self.store.student_snapshot(user_id)?;
        Ok(Checklist::from_documents(&snapshot.documents))
    }

    /// URL of the stored file behind `document`.
    pub fn file_url(&self, document: &Document) -> Result<String, WorkflowError> {
        Ok(self.files.url(&document.file_ref)?)
    }

    fn validate_upload(&self, upload: &FileUpload) -> Result<(), WorkflowError> {
        if upload.file_name.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "file name must not be empty".to_string(),
            ));
        }
        if upload.bytes.is_empty() {
            return Err(WorkflowError::Validation("file is empty".to_string()));
        }
        if upload.bytes.len() > self.max_upload_bytes {
            return Err(WorkflowError::Validation(format!(
                "file is {} bytes, the limit is {} bytes",
                upload.bytes.len(),
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    fn load_for_review(
        &self,
        actor: &User,
        document_id: &DocumentId,
        expected_version: Option<u64>,
    ) -> Result<(StudentSnapshot, Document), WorkflowError> {
        let located = self
            .store
            .document(document_id)?
            .ok_or_else(|| WorkflowError::not_found("document", document_id))?;
        let snapshot = self.store.student_snapshot(&located.owner_id)?;
        let current = snapshot
            .documents
            .iter()
            .find(|document| document.id == *document_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("document", document_id))?;

        self.guard.require(
            self.guard
                .can_act_on_document(actor, &current, &snapshot.enrollments),
            actor,
            Action::ReviewDocument,
        )?;

        if let Some(expected) = expected_version {
            if current.version != expected {
                debug!(
                    %document_id,
                    expected,
                    stored_version = current.version,
                    "stale document version"
                );
                return Err(WorkflowError::stale("document", document_id));
            }
        }
        Ok((snapshot, current))
    }

    /// Stage `document`, recompute the owner's enrollments against the resulting checklist
    /// and commit both in one unit of work.
    fn commit_with_recompute(
        &self,
        snapshot: &StudentSnapshot,
        document: Document,
        mut pending: Vec<WorkflowEvent>,
    ) -> Result<Document, WorkflowError> {
        let mut documents: Vec<Document> = snapshot
            .documents
            .iter()
            .filter(|existing| existing.id != document.id)
            .cloned()
            .collect();
        documents.push(document.clone());
        let checklist = Checklist::from_documents(&documents);

        let mut unit = UnitOfWork::for_snapshot(snapshot);
        unit.put_document(document.clone());
        pending.extend(stage_recompute(
            &snapshot.enrollments,
            &checklist,
            &mut unit,
        ));

        commit_unit(self.store.as_ref(), unit)?;
        events::dispatch(self.events.as_ref(), pending);
        Ok(document)
    }
}

fn invalid_transition(from: DocumentStatus, action: &'static str) -> WorkflowError {
    WorkflowError::InvalidStateTransition {
        entity: "document",
        from: from.label(),
        action,
    }
}
