//! Enrollment and document-verification workflow.
//!
//! A student enrolls with a driving school, uploads the four required documents, and the
//! school's manager reviews each document and then the enrollment as a whole. Enrollment
//! status always follows the student's document checklist; every mutation commits as one
//! optimistic unit of work against the [`EntityStore`].

pub mod authorization;
pub mod checklist;
pub mod clock;
pub mod documents;
pub mod domain;
pub mod error;
pub mod events;
pub mod files;
pub mod lifecycle;
pub mod router;
pub mod service;
pub mod store;
pub mod views;

#[cfg(test)]
mod tests;

pub use authorization::{Action, AuthorizationGuard};
pub use checklist::{Checklist, ChecklistEntry, ChecklistStatus};
pub use clock::{Clock, DefaultClock, FixedClock, SharedClock};
pub use documents::DocumentVerificationManager;
pub use domain::{
    Document, DocumentId, DocumentStatus, DocumentType, DrivingSchool, Enrollment, EnrollmentId,
    EnrollmentStatus, Role, SchoolId, UnknownDocumentType, User, UserId,
};
pub use error::{retry_on_conflict, WorkflowError};
pub use events::{EventSink, EventSinkError, WorkflowEvent};
pub use files::{FileRef, FileStore, FileStoreError, FileUpload, LocalFileStore};
pub use lifecycle::{next_status, EnrollmentLifecycleManager};
pub use router::enrollment_router;
pub use service::{EnrollmentWorkflow, WorkflowSettings, DEFAULT_MAX_UPLOAD_BYTES};
pub use store::{EntityStore, InMemoryEntityStore, StoreError, StudentSnapshot, UnitOfWork};
pub use views::{
    DocumentLink, DocumentSummary, EnrollmentDocuments, EnrollmentOverview, RefusedDocument,
    RosterEntry, SchoolRoster, StudentOverview,
};
