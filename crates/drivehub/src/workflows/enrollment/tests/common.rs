use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::enrollment::{
    Document, DocumentType, DrivingSchool, EnrollmentWorkflow, EntityStore, EventSink,
    EventSinkError, FileRef, FileStore, FileStoreError, FileUpload, FixedClock,
    InMemoryEntityStore, Role, SchoolId, StoreError, StudentSnapshot, UnitOfWork, User, UserId,
    WorkflowEvent, WorkflowSettings,
};
use crate::workflows::enrollment::domain::{DocumentId, Enrollment, EnrollmentId};

pub(super) const SCHOOL_W: &str = "school-w";
pub(super) const SCHOOL_N: &str = "school-n";

pub(super) type TestWorkflow = EnrollmentWorkflow<InMemoryEntityStore, MemoryFiles, MemoryEvents>;

pub(super) struct Harness {
    pub(super) workflow: Arc<TestWorkflow>,
    pub(super) store: Arc<InMemoryEntityStore>,
    pub(super) files: Arc<MemoryFiles>,
    pub(super) events: Arc<MemoryEvents>,
}

pub(super) fn student() -> User {
    User::student("stu-1")
}

pub(super) fn other_student() -> User {
    User::student("stu-2")
}

pub(super) fn manager_w() -> User {
    User::manager("mgr-w", SchoolId::from(SCHOOL_W))
}

pub(super) fn manager_n() -> User {
    User::manager("mgr-n", SchoolId::from(SCHOOL_N))
}

pub(super) fn guest() -> User {
    User {
        id: UserId::from("guest-1"),
        role: Role::Guest,
        school_id: None,
    }
}

pub(super) fn school_w() -> SchoolId {
    SchoolId::from(SCHOOL_W)
}

pub(super) fn school_n() -> SchoolId {
    SchoolId::from(SCHOOL_N)
}

pub(super) fn seed(store: &InMemoryEntityStore) {
    for user in [student(), other_student(), manager_w(), manager_n(), guest()] {
        store.register_user(user).expect("register user");
    }
    store
        .register_school(DrivingSchool {
            id: school_w(),
            manager_id: UserId::from("mgr-w"),
            name: "Westside Driving".to_string(),
        })
        .expect("register school w");
    store
        .register_school(DrivingSchool {
            id: school_n(),
            manager_id: UserId::from("mgr-n"),
            name: "Northgate Driving".to_string(),
        })
        .expect("register school n");
}

pub(super) fn settings() -> WorkflowSettings {
    WorkflowSettings {
        max_upload_bytes: 1024,
    }
}

pub(super) fn build_harness() -> Harness {
    build_harness_with(settings())
}

pub(super) fn build_harness_with(settings: WorkflowSettings) -> Harness {
    let store = Arc::new(InMemoryEntityStore::new());
    seed(&store);
    let files = Arc::new(MemoryFiles::default());
    let events = Arc::new(MemoryEvents::default());
    let clock = Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2025, 9, 1, 9, 30, 0).unwrap(),
    ));
    let workflow = Arc::new(EnrollmentWorkflow::with_clock(
        store.clone(),
        files.clone(),
        events.clone(),
        settings,
        clock,
    ));
    Harness {
        workflow,
        store,
        files,
        events,
    }
}

pub(super) fn scan(name: &str) -> FileUpload {
    FileUpload::new(name, mime::IMAGE_PNG, vec![0x89, 0x50, 0x4e, 0x47, 1, 2, 3])
}

pub(super) fn upload(
    workflow: &TestWorkflow,
    owner: &User,
    document_type: DocumentType,
) -> Document {
    workflow
        .upload_document(
            owner,
            &owner.id,
            document_type,
            scan(&format!("{document_type}.png")),
        )
        .expect("upload succeeds")
}

pub(super) fn upload_all(workflow: &TestWorkflow, owner: &User) -> Vec<Document> {
    DocumentType::REQUIRED
        .into_iter()
        .map(|document_type| upload(workflow, owner, document_type))
        .collect()
}

pub(super) fn stored_enrollment(store: &InMemoryEntityStore, id: &EnrollmentId) -> Enrollment {
    store
        .enrollment(id)
        .expect("store readable")
        .expect("enrollment stored")
}

pub(super) fn stored_document(store: &InMemoryEntityStore, id: &DocumentId) -> Document {
    store
        .document(id)
        .expect("store readable")
        .expect("document stored")
}

pub(super) async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[derive(Default)]
pub(super) struct MemoryFiles {
    files: Mutex<HashMap<FileRef, Vec<u8>>>,
    sequence: AtomicUsize,
}

impl MemoryFiles {
    pub(super) fn stored(&self) -> usize {
        self.files.lock().expect("files mutex poisoned").len()
    }
}

impl FileStore for MemoryFiles {
    fn store(&self, folder: &str, upload: &FileUpload) -> Result<FileRef, FileStoreError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let file_ref = FileRef(format!("{folder}/{id}_{}", upload.file_name));
        self.files
            .lock()
            .expect("files mutex poisoned")
            .insert(file_ref.clone(), upload.bytes.clone());
        Ok(file_ref)
    }

    fn url(&self, file_ref: &FileRef) -> Result<String, FileStoreError> {
        let guard = self.files.lock().expect("files mutex poisoned");
        if guard.contains_key(file_ref) {
            Ok(format!("memory://{file_ref}"))
        } else {
            Err(FileStoreError::UnknownReference(file_ref.to_string()))
        }
    }
}

/// File store whose backend is always down.
pub(super) struct UnavailableFiles;

impl FileStore for UnavailableFiles {
    fn store(&self, _folder: &str, _upload: &FileUpload) -> Result<FileRef, FileStoreError> {
        Err(FileStoreError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk offline",
        )))
    }

    fn url(&self, file_ref: &FileRef) -> Result<String, FileStoreError> {
        Err(FileStoreError::UnknownReference(file_ref.to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryEvents {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl MemoryEvents {
    pub(super) fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().expect("event mutex poisoned").clone()
    }

    pub(super) fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(WorkflowEvent::name).collect()
    }

    pub(super) fn clear(&self) {
        self.events.lock().expect("event mutex poisoned").clear();
    }
}

impl EventSink for MemoryEvents {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Event transport that rejects everything.
pub(super) struct BrokenEvents;

impl EventSink for BrokenEvents {
    fn publish(&self, _event: WorkflowEvent) -> Result<(), EventSinkError> {
        Err(EventSinkError::Transport("broker offline".to_string()))
    }
}

/// Store that loses the first `conflicts` commits to a simulated concurrent writer.
pub(super) struct ConflictingStore {
    pub(super) inner: InMemoryEntityStore,
    remaining: AtomicUsize,
}

impl ConflictingStore {
    pub(super) fn new(conflicts: usize) -> Self {
        let inner = InMemoryEntityStore::new();
        seed(&inner);
        Self {
            inner,
            remaining: AtomicUsize::new(conflicts),
        }
    }
}

impl EntityStore for ConflictingStore {
    fn register_user(&self, user: User) -> Result<(), StoreError> {
        self.inner.register_user(user)
    }

    fn register_school(&self, school: DrivingSchool) -> Result<(), StoreError> {
        self.inner.register_school(school)
    }

    fn user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        self.inner.user(id)
    }

    fn school(&self, id: &SchoolId) -> Result<Option<DrivingSchool>, StoreError> {
        self.inner.school(id)
    }

    fn enrollment(&self, id: &EnrollmentId) -> Result<Option<Enrollment>, StoreError> {
        self.inner.enrollment(id)
    }

    fn document(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        self.inner.document(id)
    }

    fn student_snapshot(&self, student_id: &UserId) -> Result<StudentSnapshot, StoreError> {
        self.inner.student_snapshot(student_id)
    }

    fn school_enrollments(&self, school_id: &SchoolId) -> Result<Vec<Enrollment>, StoreError> {
        self.inner.school_enrollments(school_id)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let lost_race = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if lost_race {
            return Err(StoreError::Conflict {
                entity: "student",
                id: unit.student_id().to_string(),
            });
        }
        self.inner.commit(unit)
    }
}
