use std::fmt;

use serde::Serialize;

use super::domain::{Document, Enrollment, Role, User, UserId};
use super::error::WorkflowError;

/// Everything an actor can attempt against the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Enroll,
    UploadDocument,
    ReviewDocument,
    DecideEnrollment,
    ViewChecklist,
    ViewOwnEnrollments,
    ViewSchoolRoster,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Action::Enroll => "enroll",
            Action::UploadDocument => "upload documents",
            Action::ReviewDocument => "review documents",
            Action::DecideEnrollment => "decide enrollments",
            Action::ViewChecklist => "view document checklists",
            Action::ViewOwnEnrollments => "view enrollments",
            Action::ViewSchoolRoster => "view the school roster",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Role x action table. Relationship checks (ownership, school membership) are applied on
/// top of it by the predicates below.
const PERMISSIONS: &[(Role, &[Action])] = &[
    (
        Role::Guest,
        &[
            Action::Enroll,
            Action::UploadDocument,
            Action::ViewChecklist,
            Action::ViewOwnEnrollments,
        ],
    ),
    (
        Role::Student,
        &[
            Action::Enroll,
            Action::UploadDocument,
            Action::ViewChecklist,
            Action::ViewOwnEnrollments,
        ],
    ),
    (Role::Teacher, &[Action::UploadDocument, Action::ViewChecklist]),
    (
        Role::Manager,
        &[
            Action::UploadDocument,
            Action::ReviewDocument,
            Action::DecideEnrollment,
            Action::ViewChecklist,
            Action::ViewSchoolRoster,
        ],
    ),
];

/// Stateless predicate evaluator. Never mutates, so it can run before any unit of work opens.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationGuard;

impl AuthorizationGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn permits(&self, role: Role, action: Action) -> bool {
        PERMISSIONS
            .iter()
            .find(|(candidate, _)| *candidate == role)
            .map(|(_, actions)| actions.contains(&action))
            .unwrap_or(false)
    }

    /// Guests and students enroll themselves; nobody enrolls on someone else's behalf.
    pub fn can_enroll(&self, actor: &User, student_id: &UserId) -> bool {
        self.permits(actor.role, Action::Enroll) && actor.id == *student_id
    }

    pub fn can_upload(&self, actor: &User, owner_id: &UserId) -> bool {
        self.permits(actor.role, Action::UploadDocument) && actor.id == *owner_id
    }

    pub fn can_act_on_enrollment(&self, actor: &User, enrollment: &Enrollment) -> bool {
        self.permits(actor.role, Action::DecideEnrollment)
            && actor.school_id.as_ref() == Some(&enrollment.school_id)
    }

    /// `owner_enrollments` are the enrollments of `document.owner_id`.
    pub fn can_act_on_document(
        &self,
        actor: &User,
        document: &Document,
        owner_enrollments: &[Enrollment],
    ) -> bool {
        self.permits(actor.role, Action::ReviewDocument)
            && manages_active_enrollment(actor, &document.owner_id, owner_enrollments)
    }

    pub fn can_view_checklist(
        &self,
        actor: &User,
        owner_id: &UserId,
        owner_enrollments: &[Enrollment],
    ) -> bool {
        if !self.permits(actor.role, Action::ViewChecklist) {
            return false;
        }
        actor.id == *owner_id
            || (actor.role == Role::Manager
                && manages_active_enrollment(actor, owner_id, owner_enrollments))
    }

    pub fn can_view_enrollments(&self, actor: &User, student_id: &UserId) -> bool {
        self.permits(actor.role, Action::ViewOwnEnrollments) && actor.id == *student_id
    }

    pub fn can_view_roster(&self, actor: &User) -> bool {
        self.permits(actor.role, Action::ViewSchoolRoster) && actor.school_id.is_some()
    }

    /// Turn a failed predicate into `Forbidden`.
    pub fn require(&self, allowed: bool, actor: &User, action: Action) -> Result<(), WorkflowError> {
        if allowed {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden {
                actor: actor.id.clone(),
                action,
            })
        }
    }
}

fn manages_active_enrollment(actor: &User, owner_id: &UserId, enrollments: &[Enrollment]) -> bool {
    let Some(school_id) = actor.school_id.as_ref() else {
        return false;
    };
    enrollments.iter().any(|enrollment| {
        enrollment.student_id == *owner_id
            && enrollment.is_active()
            && enrollment.school_id == *school_id
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::enrollment::domain::{
        DocumentId, DocumentStatus, DocumentType, EnrollmentId, EnrollmentStatus, SchoolId,
    };
    use crate::workflows::enrollment::files::FileRef;
    use chrono::{TimeZone, Utc};

    fn enrollment(student: &str, school: &str, status: EnrollmentStatus) -> Enrollment {
        Enrollment {
            id: EnrollmentId(format!("enr-{student}-{school}")),
            student_id: UserId::from(student),
            school_id: SchoolId::from(school),
            status,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            decided_by: None,
            version: 1,
        }
    }

    fn document(owner: &str) -> Document {
        Document {
            id: DocumentId::from("doc-1"),
            owner_id: UserId::from(owner),
            document_type: DocumentType::IdCard,
            status: DocumentStatus::Pending,
            file_ref: FileRef("documents/id_card/1.png".to_string()),
            file_name: "id.png".to_string(),
            content_type: "image/png".to_string(),
            file_size: 10,
            upload_date: Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap(),
            refusal_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            version: 1,
        }
    }

    #[test]
    fn upload_is_self_service_only() {
        let guard = AuthorizationGuard::new();
        let student = User::student("stu-1");
        let manager = User::manager("mgr-1", SchoolId::from("school-w"));

        assert!(guard.can_upload(&student, &UserId::from("stu-1")));
        assert!(!guard.can_upload(&student, &UserId::from("stu-2")));
        assert!(!guard.can_upload(&manager, &UserId::from("stu-1")));
    }

    #[test]
    fn enrollment_decisions_require_managing_the_school() {
        let guard = AuthorizationGuard::new();
        let record = enrollment("stu-1", "school-w", EnrollmentStatus::PendingApproval);

        let owner = User::manager("mgr-w", SchoolId::from("school-w"));
        let other = User::manager("mgr-n", SchoolId::from("school-n"));
        let teacher = User {
            id: UserId::from("tch-w"),
            role: Role::Teacher,
            school_id: Some(SchoolId::from("school-w")),
        };

        assert!(guard.can_act_on_enrollment(&owner, &record));
        assert!(!guard.can_act_on_enrollment(&other, &record));
        assert!(!guard.can_act_on_enrollment(&teacher, &record));
    }

    #[test]
    fn document_review_requires_an_active_enrollment_at_the_managers_school() {
        let guard = AuthorizationGuard::new();
        let doc = document("stu-1");
        let manager = User::manager("mgr-w", SchoolId::from("school-w"));

        let active = vec![enrollment("stu-1", "school-w", EnrollmentStatus::PendingDocuments)];
        assert!(guard.can_act_on_document(&manager, &doc, &active));

        let rejected = vec![enrollment("stu-1", "school-w", EnrollmentStatus::Rejected)];
        assert!(!guard.can_act_on_document(&manager, &doc, &rejected));

        let elsewhere = vec![enrollment("stu-1", "school-n", EnrollmentStatus::Approved)];
        assert!(!guard.can_act_on_document(&manager, &doc, &elsewhere));
        assert!(!guard.can_act_on_document(&manager, &doc, &[]));
    }

    #[test]
    fn only_guests_and_students_enroll_themselves() {
        let guard = AuthorizationGuard::new();
        let guest = User {
            id: UserId::from("guest-1"),
            role: Role::Guest,
            school_id: None,
        };
        let manager = User::manager("mgr-w", SchoolId::from("school-w"));

        assert!(guard.can_enroll(&guest, &UserId::from("guest-1")));
        assert!(!guard.can_enroll(&guest, &UserId::from("stu-1")));
        assert!(!guard.can_enroll(&manager, &UserId::from("mgr-w")));
    }

    #[test]
    fn checklist_is_visible_to_owner_and_reviewing_manager() {
        let guard = AuthorizationGuard::new();
        let owner = UserId::from("stu-1");
        let enrollments = vec![enrollment("stu-1", "school-w", EnrollmentStatus::PendingApproval)];

        assert!(guard.can_view_checklist(&User::student("stu-1"), &owner, &enrollments));
        assert!(!guard.can_view_checklist(&User::student("stu-2"), &owner, &enrollments));
        assert!(guard.can_view_checklist(
            &User::manager("mgr-w", SchoolId::from("school-w")),
            &owner,
            &enrollments
        ));
        assert!(!guard.can_view_checklist(
            &User::manager("mgr-n", SchoolId::from("school-n")),
            &owner,
            &enrollments
        ));
    }

    #[test]
    fn require_maps_denials_to_forbidden() {
        let guard = AuthorizationGuard::new();
        let actor = User::student("stu-1");
        assert!(guard.require(true, &actor, Action::Enroll).is_ok());
        match guard.require(false, &actor, Action::DecideEnrollment) {
            Err(WorkflowError::Forbidden { actor, action }) => {
                assert_eq!(actor, UserId::from("stu-1"));
                assert_eq!(action, Action::DecideEnrollment);
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }
}
