use std::cmp::Reverse;

use serde::Serialize;

use super::checklist::{Checklist, ChecklistStatus};
use super::domain::{
    DocumentId, DocumentType, Enrollment, EnrollmentId, EnrollmentStatus, SchoolId, UserId,
};
use super::store::StudentSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefusedDocument {
    pub document_type: DocumentType,
    pub reason: String,
}

/// Counts over a checklist, as shown next to each of a student's enrollments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub total_required: usize,
    pub total_uploaded: usize,
    pub total_accepted: usize,
    pub total_refused: usize,
    pub refused: Vec<RefusedDocument>,
}

impl DocumentSummary {
    pub fn from_checklist(checklist: &Checklist) -> Self {
        Self {
            total_required: DocumentType::REQUIRED.len(),
            total_uploaded: checklist.uploaded(),
            total_accepted: checklist.count(ChecklistStatus::Accepted),
            total_refused: checklist.count(ChecklistStatus::Refused),
            refused: checklist
                .refusals()
                .into_iter()
                .map(|(document_type, reason)| RefusedDocument {
                    document_type,
                    reason,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentOverview {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub documents: DocumentSummary,
    pub can_reapply: bool,
}

/// Everything a student sees on their enrollment status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentOverview {
    pub student_id: UserId,
    pub checklist: Checklist,
    pub enrollments: Vec<EnrollmentOverview>,
}

impl StudentOverview {
    pub fn from_snapshot(snapshot: &StudentSnapshot) -> Self {
        let checklist = Checklist::from_documents(&snapshot.documents);
        let summary = DocumentSummary::from_checklist(&checklist);
        let enrollments = newest_first(snapshot.enrollments.clone())
            .into_iter()
            .map(|enrollment| {
                let can_reapply = enrollment.status == EnrollmentStatus::Rejected
                    && !snapshot.enrollments.iter().any(|other| {
                        other.school_id == enrollment.school_id && other.is_active()
                    });
                EnrollmentOverview {
                    enrollment,
                    documents: summary.clone(),
                    can_reapply,
                }
            })
            .collect();

        Self {
            student_id: snapshot.student_id.clone(),
            checklist,
            enrollments,
        }
    }
}

/// One line of a manager's roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub checklist: Checklist,
    pub documents_verified: bool,
}

impl RosterEntry {
    pub fn new(enrollment: Enrollment, checklist: Checklist) -> Self {
        let documents_verified = checklist.is_fully_accepted();
        Self {
            enrollment,
            checklist,
            documents_verified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchoolRoster {
    pub school_id: SchoolId,
    pub enrollments: Vec<RosterEntry>,
}

/// The checklist a manager reviews for one enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentDocuments {
    pub enrollment_id: EnrollmentId,
    pub student_id: UserId,
    pub status: EnrollmentStatus,
    pub version: u64,
    pub checklist: Checklist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentLink {
    pub document_id: DocumentId,
    pub url: String,
}

pub(crate) fn newest_first(mut enrollments: Vec<Enrollment>) -> Vec<Enrollment> {
    enrollments.sort_by_key(|enrollment| Reverse((enrollment.created_at, enrollment.id.clone())));
    enrollments
}
