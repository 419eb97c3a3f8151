//! Durable storage for users, schools, enrollments and documents.
//!
//! Reads hand out snapshots; writes only happen through [`EntityStore::commit`], which applies
//! a whole [`UnitOfWork`] or nothing. Every student carries a revision covering all of their
//! enrollments and documents, so a unit of work built from a stale snapshot is rejected even
//! when the rows it writes were not the ones that changed.

mod memory;

pub use memory::InMemoryEntityStore;

use super::domain::{
    Document, DocumentId, DocumentType, DrivingSchool, Enrollment, EnrollmentId, SchoolId, User,
    UserId,
};

/// Everything the workflow may read or write for one student, as of `revision`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSnapshot {
    pub student_id: UserId,
    pub revision: u64,
    pub enrollments: Vec<Enrollment>,
    pub documents: Vec<Document>,
}

impl StudentSnapshot {
    pub fn empty(student_id: UserId) -> Self {
        Self {
            student_id,
            revision: 0,
            enrollments: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn document(&self, document_type: DocumentType) -> Option<&Document> {
        self.documents
            .iter()
            .find(|document| document.document_type == document_type)
    }

    pub fn enrollment(&self, id: &EnrollmentId) -> Option<&Enrollment> {
        self.enrollments.iter().find(|enrollment| enrollment.id == *id)
    }
}

/// Staged writes against one student snapshot.
///
/// Records at version 1 are inserts; anything else must be exactly one version ahead of the
/// stored row.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    student_id: UserId,
    revision: u64,
    enrollments: Vec<Enrollment>,
    documents: Vec<Document>,
}

impl UnitOfWork {
    pub fn for_snapshot(snapshot: &StudentSnapshot) -> Self {
        Self {
            student_id: snapshot.student_id.clone(),
            revision: snapshot.revision,
            enrollments: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn student_id(&self) -> &UserId {
        &self.student_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Stage an enrollment write, replacing an earlier staged write with the same id.
    pub fn put_enrollment(&mut self, enrollment: Enrollment) {
        match self
            .enrollments
            .iter_mut()
            .find(|staged| staged.id == enrollment.id)
        {
            Some(staged) => *staged = enrollment,
            None => self.enrollments.push(enrollment),
        }
    }

    /// Stage a document write, replacing an earlier staged write with the same id.
    pub fn put_document(&mut self, document: Document) {
        match self
            .documents
            .iter_mut()
            .find(|staged| staged.id == document.id)
        {
            Some(staged) => *staged = document,
            None => self.documents.push(document),
        }
    }

    pub fn enrollments(&self) -> &[Enrollment] {
        &self.enrollments
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.enrollments.is_empty() && self.documents.is_empty()
    }
}

/// Storage abstraction so the workflow managers can be exercised in isolation.
pub trait EntityStore: Send + Sync {
    fn register_user(&self, user: User) -> Result<(), StoreError>;
    fn register_school(&self, school: DrivingSchool) -> Result<(), StoreError>;
    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    fn school(&self, id: &SchoolId) -> Result<Option<DrivingSchool>, StoreError>;
    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError>;
    fn document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError>;
    fn student_snapshot(&self, student_id: &UserId) -> Result<StudentSnapshot, StoreError>;
    fn school_enrollments(&self, school_id: &SchoolId) -> Result<Vec<Enrollment>, StoreError>;
    /// Apply every staged write atomically, or none of them.
    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} changed since it was read")]
    Conflict { entity: &'static str, id: String },
    #[error("{entity} {id} is already registered")]
    AlreadyRegistered { entity: &'static str, id: String },
    #[error("{entity} {id} does not belong to the unit of work's student")]
    OutOfScope { entity: &'static str, id: String },
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
}
