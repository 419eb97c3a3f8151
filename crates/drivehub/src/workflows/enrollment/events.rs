use serde::Serialize;

use super::domain::{DocumentId, DocumentType, EnrollmentId, SchoolId, UserId};

/// Notifications emitted after a unit of work commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    EnrollmentCreated {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        school_id: SchoolId,
    },
    /// Every required document is uploaded and none is refused.
    EnrollmentSubmittedForReview {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        school_id: SchoolId,
    },
    EnrollmentReturnedToDocuments {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        school_id: SchoolId,
    },
    EnrollmentApproved {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        school_id: SchoolId,
        approved_by: UserId,
    },
    EnrollmentRejected {
        enrollment_id: EnrollmentId,
        student_id: UserId,
        school_id: SchoolId,
        rejected_by: UserId,
        reason: String,
    },
    DocumentAccepted {
        document_id: DocumentId,
        owner_id: UserId,
        document_type: DocumentType,
        reviewed_by: UserId,
    },
    DocumentRefused {
        document_id: DocumentId,
        owner_id: UserId,
        document_type: DocumentType,
        reviewed_by: UserId,
        reason: String,
    },
}

impl WorkflowEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::EnrollmentCreated { .. } => "enrollment_created",
            WorkflowEvent::EnrollmentSubmittedForReview { .. } => "enrollment_submitted_for_review",
            WorkflowEvent::EnrollmentReturnedToDocuments { .. } => {
                "enrollment_returned_to_documents"
            }
            WorkflowEvent::EnrollmentApproved { .. } => "enrollment_approved",
            WorkflowEvent::EnrollmentRejected { .. } => "enrollment_rejected",
            WorkflowEvent::DocumentAccepted { .. } => "document_accepted",
            WorkflowEvent::DocumentRefused { .. } => "document_refused",
        }
    }
}

/// Trait describing outbound notification hooks (push, e-mail, websocket fan-out).
pub trait EventSink: Send + Sync {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Best-effort delivery. The writes these events describe are already committed.
pub(crate) fn dispatch<E: EventSink + ?Sized>(sink: &E, events: Vec<WorkflowEvent>) {
    for event in events {
        let name = event.name();
        if let Err(err) = sink.publish(event) {
            tracing::warn!(event = name, error = %err, "failed to publish workflow event");
        }
    }
}
