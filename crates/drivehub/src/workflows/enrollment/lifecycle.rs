use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use super::authorization::{Action, AuthorizationGuard};
use super::checklist::Checklist;
use super::clock::SharedClock;
use super::domain::{Enrollment, EnrollmentId, EnrollmentStatus, SchoolId, User, UserId};
use super::error::WorkflowError;
use super::events::{self, EventSink, WorkflowEvent};
use super::store::{EntityStore, StoreError, StudentSnapshot, UnitOfWork};

static ENROLLMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_enrollment_id() -> EnrollmentId {
    let id = ENROLLMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EnrollmentId(format!("enr-{id:06}"))
}

/// Status an enrollment should move to given the owner's checklist, if any.
///
/// Only the two pending states react to documents; approved and rejected enrollments are
/// decisions and stay put.
pub fn next_status(status: EnrollmentStatus, checklist: &Checklist) -> Option<EnrollmentStatus> {
    match status {
        EnrollmentStatus::PendingDocuments if checklist.is_ready_for_review() => {
            Some(EnrollmentStatus::PendingApproval)
        }
        EnrollmentStatus::PendingApproval if checklist.has_refusal() => {
            Some(EnrollmentStatus::PendingDocuments)
        }
        EnrollmentStatus::PendingDocuments
        | EnrollmentStatus::PendingApproval
        | EnrollmentStatus::Approved
        | EnrollmentStatus::Rejected => None,
    }
}

/// Owns enrollment creation, manager decisions and checklist-driven status changes.
pub struct EnrollmentLifecycleManager<S, E> {
    store: Arc<S>,
    events: Arc<E>,
    clock: SharedClock,
    guard: AuthorizationGuard,
}

impl<S, E> EnrollmentLifecycleManager<S, E>
where
    S: EntityStore + 'static,
    E: EventSink + 'static,
{
    pub fn new(store: Arc<S>, events: Arc<E>, clock: SharedClock) -> Self {
        Self {
            store,
            events,
            clock,
            guard: AuthorizationGuard::new(),
        }
    }

    /// Open a new enrollment for `student_id` at `school_id`.
    ///
    /// Starts in `pending_documents`, or directly in `pending_approval` when the student's
    /// shared checklist is already complete.
    pub fn enroll(
        &self,
        actor: &User,
        student_id: &UserId,
        school_id: &SchoolId,
    ) -> Result<Enrollment, WorkflowError> {
        self.guard
            .require(self.guard.can_enroll(actor, student_id), actor, Action::Enroll)?;

        if self.store.school(school_id)?.is_none() {
            return Err(WorkflowError::not_found("school", school_id));
        }

        let snapshot = self.store.student_snapshot(student_id)?;
        if snapshot
            .enrollments
            .iter()
            .any(|existing| existing.school_id == *school_id && existing.is_active())
        {
            return Err(WorkflowError::DuplicateEnrollment {
                student_id: student_id.clone(),
                school_id: school_id.clone(),
            });
        }

        let mut created = Enrollment {
            id: next_enrollment_id(),
            student_id: student_id.clone(),
            school_id: school_id.clone(),
            status: EnrollmentStatus::PendingDocuments,
            created_at: self.clock.utc(),
            approved_at: None,
            rejected_at: None,
            rejection_reason: None,
            decided_by: None,
            version: 1,
        };
        let mut pending = vec![WorkflowEvent::EnrollmentCreated {
            enrollment_id: created.id.clone(),
            student_id: student_id.clone(),
            school_id: school_id.clone(),
        }];

        let checklist = Checklist::from_documents(&snapshot.documents);
        if let Some(status) = next_status(created.status, &checklist) {
            created.status = status;
            pending.extend(status_event(&created));
        }

        let mut unit = UnitOfWork::for_snapshot(&snapshot);
        unit.put_enrollment(created.clone());
        self.commit(unit, pending)?;
        info!(
            enrollment_id = %created.id,
            %student_id,
            %school_id,
            status = created.status.label(),
            "enrollment created"
        );
        Ok(created)
    }

    /// Approve an enrollment that is waiting for review.
    pub fn approve(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
        expected_version: u64,
    ) -> Result<Enrollment, WorkflowError> {
        let (snapshot, current) = self.load_for_decision(actor, enrollment_id, expected_version)?;
        if current.status != EnrollmentStatus::PendingApproval {
            return Err(invalid_transition(current.status, "approve"));
        }

        let now = self.clock.utc();
        let mut approved = current;
        approved.status = EnrollmentStatus::Approved;
        approved.approved_at = Some(now);
        approved.decided_by = Some(actor.id.clone());
        approved.version += 1;

        let mut unit = UnitOfWork::for_snapshot(&snapshot);
        unit.put_enrollment(approved.clone());
        self.commit(
            unit,
            vec![WorkflowEvent::EnrollmentApproved {
                enrollment_id: approved.id.clone(),
                student_id: approved.student_id.clone(),
                school_id: approved.school_id.clone(),
                approved_by: actor.id.clone(),
            }],
        )?;

        info!(enrollment_id = %approved.id, manager = %actor.id, "enrollment approved");
        Ok(approved)
    }

    /// Reject an enrollment that is waiting for review. Documents are left untouched.
    pub fn refuse(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
        expected_version: u64,
        reason: &str,
    ) -> Result<Enrollment, WorkflowError> {
        let reason = required_reason(reason)?;
        let (snapshot, current) = self.load_for_decision(actor, enrollment_id, expected_version)?;
        if current.status != EnrollmentStatus::PendingApproval {
            return Err(invalid_transition(current.status, "refuse"));
        }

        let now = self.clock.utc();
        let mut rejected = current;
        rejected.status = EnrollmentStatus::Rejected;
        rejected.rejected_at = Some(now);
        rejected.rejection_reason = Some(reason.clone());
        rejected.decided_by = Some(actor.id.clone());
        rejected.version += 1;

        let mut unit = UnitOfWork::for_snapshot(&snapshot);
        unit.put_enrollment(rejected.clone());
        self.commit(
            unit,
            vec![WorkflowEvent::EnrollmentRejected {
                enrollment_id: rejected.id.clone(),
                student_id: rejected.student_id.clone(),
                school_id: rejected.school_id.clone(),
                rejected_by: actor.id.clone(),
                reason,
            }],
        )?;

        info!(enrollment_id = %rejected.id, manager = %actor.id, "enrollment rejected");
        Ok(rejected)
    }

    /// Bring every pending enrollment of `student_id` in line with the current checklist.
    ///
    /// Idempotent: returns the enrollments that changed and commits nothing when none did.
    pub fn recompute_status(&self, student_id: &UserId) -> Result<Vec<Enrollment>, WorkflowError> {
        let snapshot = self.store.student_snapshot(student_id)?;
        let checklist = Checklist::from_documents(&snapshot.documents);
        let mut unit = UnitOfWork::for_snapshot(&snapshot);
        let pending = stage_recompute(&snapshot.enrollments, &checklist, &mut unit);
        if unit.is_empty() {
            return Ok(Vec::new());
        }

        let changed = unit.enrollments().to_vec();
        self.commit(unit, pending)?;
        Ok(changed)
    }

    fn load_for_decision(
        &self,
        actor: &User,
        enrollment_id: &EnrollmentId,
        expected_version: u64,
    ) -> Result<(StudentSnapshot, Enrollment), WorkflowError> {
        let located = self
            .store
            .enrollment(enrollment_id)?
            .ok_or_else(|| WorkflowError::not_found("enrollment", enrollment_id))?;
        self.guard.require(
            self.guard.can_act_on_enrollment(actor, &located),
            actor,
            Action::DecideEnrollment,
        )?;

        let snapshot = self.store.student_snapshot(&located.student_id)?;
        let current = snapshot
            .enrollment(enrollment_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("enrollment", enrollment_id))?;
        if current.version != expected_version {
            debug!(
                %enrollment_id,
                expected_version,
                stored_version = current.version,
                "stale enrollment version"
            );
            return Err(WorkflowError::stale("enrollment", enrollment_id));
        }
        Ok((snapshot, current))
    }

    fn commit(&self, unit: UnitOfWork, pending: Vec<WorkflowEvent>) -> Result<(), WorkflowError> {
        commit_unit(self.store.as_ref(), unit)?;
        events::dispatch(self.events.as_ref(), pending);
        Ok(())
    }
}

/// Stage the status changes `checklist` implies for `enrollments` into `unit`.
///
/// Document mutations call this too, so the recompute lands in their unit of work.
pub(crate) fn stage_recompute(
    enrollments: &[Enrollment],
    checklist: &Checklist,
    unit: &mut UnitOfWork,
) -> Vec<WorkflowEvent> {
    let mut pending = Vec::new();
    for enrollment in enrollments {
        let Some(status) = next_status(enrollment.status, checklist) else {
            continue;
        };

        let mut updated = enrollment.clone();
        updated.status = status;
        updated.version += 1;
        info!(
            enrollment_id = %updated.id,
            from = enrollment.status.label(),
            to = status.label(),
            "enrollment status recomputed"
        );
        pending.extend(status_event(&updated));
        unit.put_enrollment(updated);
    }
    pending
}

/// Commit and log conflicts. Shared by both managers.
pub(crate) fn commit_unit<S: EntityStore + ?Sized>(
    store: &S,
    unit: UnitOfWork,
) -> Result<(), WorkflowError> {
    let student_id = unit.student_id().clone();
    store.commit(unit).map_err(|err| {
        if let StoreError::Conflict { entity, id } = &err {
            debug!(%student_id, entity, %id, "unit of work lost an optimistic race");
        }
        WorkflowError::from(err)
    })
}

pub(crate) fn required_reason(reason: &str) -> Result<String, WorkflowError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::Validation(
            "a non-empty reason is required".to_string(),
        ))
    } else {
        Ok(trimmed.to_string())
    }
}

fn invalid_transition(from: EnrollmentStatus, action: &'static str) -> WorkflowError {
    WorkflowError::InvalidStateTransition {
        entity: "enrollment",
        from: from.label(),
        action,
    }
}

/// Event announcing a checklist-driven move into `enrollment.status`.
///
/// Decided enrollments are only reached through `approve`/`refuse`, which announce themselves.
fn status_event(enrollment: &Enrollment) -> Option<WorkflowEvent> {
    let enrollment_id = enrollment.id.clone();
    let student_id = enrollment.student_id.clone();
    let school_id = enrollment.school_id.clone();
    match enrollment.status {
        EnrollmentStatus::PendingApproval => Some(WorkflowEvent::EnrollmentSubmittedForReview {
            enrollment_id,
            student_id,
            school_id,
        }),
        EnrollmentStatus::PendingDocuments => Some(WorkflowEvent::EnrollmentReturnedToDocuments {
            enrollment_id,
            student_id,
            school_id,
        }),
        EnrollmentStatus::Approved | EnrollmentStatus::Rejected => None,
    }
}
