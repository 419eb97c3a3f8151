use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{EntityStore, StoreError, StudentSnapshot, UnitOfWork};
use crate::workflows::enrollment::domain::{
    Document, DocumentId, DrivingSchool, Enrollment, EnrollmentId, SchoolId, User, UserId,
};

/// Process-local store. One mutex makes every commit a single critical section.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    schools: HashMap<SchoolId, DrivingSchool>,
    enrollments: BTreeMap<EnrollmentId, Enrollment>,
    documents: BTreeMap<DocumentId, Document>,
    revisions: HashMap<UserId, u64>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("entity store mutex poisoned".to_string()))
    }
}

impl State {
    fn validate(&self, unit: &UnitOfWork) -> Result<(), StoreError> {
        let student_id = unit.student_id();
        let stored_revision = self.revisions.get(student_id).copied().unwrap_or(0);
        if stored_revision != unit.revision() {
            return Err(StoreError::Conflict {
                entity: "student",
                id: student_id.to_string(),
            });
        }

        for enrollment in unit.enrollments() {
            if enrollment.student_id != *student_id {
                return Err(out_of_scope("enrollment", &enrollment.id));
            }
            let stored = self.enrollments.get(&enrollment.id);
            if let Some(stored) = stored {
                if stored.student_id != *student_id {
                    return Err(out_of_scope("enrollment", &enrollment.id));
                }
            }
            check_version(
                "enrollment",
                &enrollment.id,
                stored.map(|row| row.version),
                enrollment.version,
            )?;
        }

        for (index, document) in unit.documents().iter().enumerate() {
            if document.owner_id != *student_id {
                return Err(out_of_scope("document", &document.id));
            }
            let stored = self.documents.get(&document.id);
            if let Some(stored) = stored {
                if stored.owner_id != *student_id
                    || stored.document_type != document.document_type
                {
                    return Err(out_of_scope("document", &document.id));
                }
            }
            check_version(
                "document",
                &document.id,
                stored.map(|row| row.version),
                document.version,
            )?;

            if document.version == 1 {
                let key_taken = self.documents.values().any(|row| {
                    row.owner_id == document.owner_id && row.document_type == document.document_type
                }) || unit.documents()[..index].iter().any(|staged| {
                    staged.document_type == document.document_type
                });
                if key_taken {
                    return Err(StoreError::Conflict {
                        entity: "document",
                        id: document.id.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, unit: UnitOfWork) {
        let revision = unit.revision() + 1;
        self.revisions.insert(unit.student_id().clone(), revision);
        for enrollment in unit.enrollments() {
            self.enrollments
                .insert(enrollment.id.clone(), enrollment.clone());
        }
        for document in unit.documents() {
            self.documents.insert(document.id.clone(), document.clone());
        }
    }
}

fn check_version(
    entity: &'static str,
    id: &impl ToString,
    stored: Option<u64>,
    staged: u64,
) -> Result<(), StoreError> {
    let consistent = match stored {
        None => staged == 1,
        Some(current) => staged == current + 1,
    };
    if consistent {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            entity,
            id: id.to_string(),
        })
    }
}

fn out_of_scope(entity: &'static str, id: &impl ToString) -> StoreError {
    StoreError::OutOfScope {
        entity,
        id: id.to_string(),
    }
}

impl EntityStore for InMemoryEntityStore {
    fn register_user(&self, user: User) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::AlreadyRegistered {
                entity: "user",
                id: user.id.to_string(),
            });
        }
        state.users.insert(user.id.clone(), user);
        Ok(())
    }

    fn register_school(&self, school: DrivingSchool) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.schools.contains_key(&school.id) {
            return Err(StoreError::AlreadyRegistered {
                entity: "school",
                id: school.id.to_string(),
            });
        }
        state.schools.insert(school.id.clone(), school);
        Ok(())
    }

    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state()?.users.get(id).cloned())
    }

    fn school(&self, id: &SchoolId) -> Result<Option<DrivingSchool>, StoreError> {
        Ok(self.state()?.schools.get(id).cloned())
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        Ok(self.state()?.enrollments.get(id).cloned())
    }

    fn document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        Ok(self.state()?.documents.get(id).cloned())
    }

    fn student_snapshot(&self, student_id: &UserId) -> Result<StudentSnapshot, StoreError> {
        let state = self.state()?;
        Ok(StudentSnapshot {
            student_id: student_id.clone(),
            revision: state.revisions.get(student_id).copied().unwrap_or(0),
            enrollments: state
                .enrollments
                .values()
                .filter(|enrollment| enrollment.student_id == *student_id)
                .cloned()
                .collect(),
            documents: state
                .documents
                .values()
                .filter(|document| document.owner_id == *student_id)
                .cloned()
                .collect(),
        })
    }

    fn school_enrollments(&self, school_id: &SchoolId) -> Result<Vec<Enrollment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .enrollments
            .values()
            .filter(|enrollment| enrollment.school_id == *school_id)
            .cloned()
            .collect())
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let mut state = self.state()?;
        state.validate(&unit)?;
        state.apply(unit);
        Ok(())
    }
}
