use drivehub::workflows::enrollment::{
    DrivingSchool, EntityStore, EventSink, EventSinkError, FileRef, FileStore, FileStoreError,
    FileUpload, Role, SchoolId, StoreError, User, UserId, WorkflowEvent,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Event sink that logs every workflow event and keeps it for inspection.
#[derive(Default, Clone)]
pub(crate) struct InMemoryEventSink {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: WorkflowEvent) -> Result<(), EventSinkError> {
        info!(event = event.name(), "workflow event");
        let mut guard = self
            .events
            .lock()
            .map_err(|_| EventSinkError::Transport("event buffer poisoned".to_string()))?;
        guard.push(event);
        Ok(())
    }
}

impl InMemoryEventSink {
    pub(crate) fn drain(&self) -> Vec<WorkflowEvent> {
        self.events
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }
}

/// File store keeping uploads in process memory. Used by the demo.
#[derive(Default)]
pub(crate) struct InMemoryFileStore {
    files: Mutex<HashMap<FileRef, Vec<u8>>>,
    sequence: AtomicU64,
}

impl FileStore for InMemoryFileStore {
    fn store(&self, folder: &str, upload: &FileUpload) -> Result<FileRef, FileStoreError> {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let file_ref = FileRef(format!("{folder}/{id:04}_{}", upload.file_name));
        let mut guard = self.files.lock().map_err(|_| {
            FileStoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "in-memory file store poisoned",
            ))
        })?;
        guard.insert(file_ref.clone(), upload.bytes.clone());
        Ok(file_ref)
    }

    fn url(&self, file_ref: &FileRef) -> Result<String, FileStoreError> {
        let known = self
            .files
            .lock()
            .map(|guard| guard.contains_key(file_ref))
            .unwrap_or(false);
        if known {
            Ok(format!("memory://{file_ref}"))
        } else {
            Err(FileStoreError::UnknownReference(file_ref.to_string()))
        }
    }
}

pub(crate) const DEMO_STUDENT: &str = "student-sara";
pub(crate) const DEMO_GUEST: &str = "guest-gil";
pub(crate) const WEST_MANAGER: &str = "manager-west";
pub(crate) const NORTH_MANAGER: &str = "manager-north";
pub(crate) const WEST_SCHOOL: &str = "school-west";
pub(crate) const NORTH_SCHOOL: &str = "school-north";

/// Register the sample directory of users and schools. Account management lives elsewhere.
pub(crate) fn seed_directory<S: EntityStore>(store: &S) -> Result<(), StoreError> {
    let users = [
        User::student(DEMO_STUDENT),
        User {
            id: UserId::from(DEMO_GUEST),
            role: Role::Guest,
            school_id: None,
        },
        User::manager(WEST_MANAGER, SchoolId::from(WEST_SCHOOL)),
        User::manager(NORTH_MANAGER, SchoolId::from(NORTH_SCHOOL)),
    ];
    for user in users {
        store.register_user(user)?;
    }

    for (id, manager, name) in [
        (WEST_SCHOOL, WEST_MANAGER, "West End Driving School"),
        (NORTH_SCHOOL, NORTH_MANAGER, "North Road Driving School"),
    ] {
        store.register_school(DrivingSchool {
            id: SchoolId::from(id),
            manager_id: UserId::from(manager),
            name: name.to_string(),
        })?;
    }
    Ok(())
}

/// Build an upload whose content type is guessed from the file name.
pub(crate) fn guessed_upload(file_name: &str, bytes: Vec<u8>) -> FileUpload {
    let content_type = mime_guess::from_path(file_name).first_or_octet_stream();
    FileUpload::new(file_name, content_type, bytes)
}
