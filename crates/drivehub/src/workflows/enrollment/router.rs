use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{DocumentId, DocumentType, EnrollmentId, SchoolId, UserId};
use super::error::WorkflowError;
use super::events::EventSink;
use super::files::{FileStore, FileUpload};
use super::service::EnrollmentWorkflow;
use super::store::EntityStore;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub actor_id: UserId,
    pub student_id: UserId,
    pub school_id: SchoolId,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub actor_id: UserId,
    pub user_id: UserId,
    pub document_type: String,
    pub file_name: String,
    pub content_base64: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentReviewRequest {
    pub actor_id: UserId,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentDecisionRequest {
    pub actor_id: UserId,
    pub version: u64,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: UserId,
}

/// Room left in an upload body for everything except the encoded file.
const UPLOAD_ENVELOPE_BYTES: usize = 64 * 1024;

/// Largest upload request body: the base64 form of the biggest accepted file plus the
/// JSON envelope. Keeps oversized files flowing into upload validation instead of being
/// cut off by the default body limit.
pub fn upload_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(UPLOAD_ENVELOPE_BYTES)
}

/// Router builder exposing the enrollment and document review endpoints.
pub fn enrollment_router<S, F, E>(workflow: Arc<EnrollmentWorkflow<S, F, E>>) -> Router
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let body_limit = upload_body_limit(workflow.settings().max_upload_bytes);
    Router::new()
        .route("/api/v1/enroll", post(enroll_handler::<S, F, E>))
        .route(
            "/api/v1/documents/upload",
            post(upload_handler::<S, F, E>).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/v1/documents/:document_id/accept",
            post(accept_document_handler::<S, F, E>),
        )
        .route(
            "/api/v1/documents/:document_id/refuse",
            post(refuse_document_handler::<S, F, E>),
        )
        .route(
            "/api/v1/documents/:document_id/url",
            get(document_url_handler::<S, F, E>),
        )
        .route(
            "/api/v1/enrollments/:enrollment_id/approve",
            post(approve_handler::<S, F, E>),
        )
        .route(
            "/api/v1/enrollments/:enrollment_id/refuse",
            post(refuse_enrollment_handler::<S, F, E>),
        )
        .route(
            "/api/v1/enrollments/:enrollment_id/documents",
            get(enrollment_documents_handler::<S, F, E>),
        )
        .route(
            "/api/v1/users/:user_id/document-checklist",
            get(checklist_handler::<S, F, E>),
        )
        .route(
            "/api/v1/users/:user_id/enrollments",
            get(student_overview_handler::<S, F, E>),
        )
        .route(
            "/api/v1/schools/enrollments",
            get(roster_handler::<S, F, E>),
        )
        .with_state(workflow)
}

/// HTTP status for each workflow failure.
pub fn status_for(error: &WorkflowError) -> StatusCode {
    match error {
        WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Forbidden { .. } => StatusCode::FORBIDDEN,
        WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
        WorkflowError::InvalidStateTransition { .. }
        | WorkflowError::DuplicateEnrollment { .. }
        | WorkflowError::Conflict { .. } => StatusCode::CONFLICT,
        WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        WorkflowError::FileStore(_) => StatusCode::BAD_GATEWAY,
    }
}

pub fn error_response(error: WorkflowError) -> Response {
    let status = status_for(&error);
    let payload = if error.is_retryable() {
        json!({ "error": error.to_string(), "retryable": true })
    } else {
        json!({ "error": error.to_string() })
    };
    (status, Json(payload)).into_response()
}

fn respond<T: Serialize>(status: StatusCode, outcome: Result<T, WorkflowError>) -> Response {
    match outcome {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn enroll_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Json(request): Json<EnrollRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let outcome = workflow
        .resolve_actor(&request.actor_id)
        .and_then(|actor| workflow.enroll(&actor, &request.student_id, &request.school_id));
    respond(StatusCode::CREATED, outcome)
}

pub(crate) async fn upload_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Json(request): Json<UploadRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let (document_type, upload) = match decode_upload(&request) {
        Ok(decoded) => decoded,
        Err(error) => return error_response(error),
    };

    // File stores do blocking io.
    let outcome = tokio::task::spawn_blocking(move || {
        let actor = workflow.resolve_actor(&request.actor_id)?;
        workflow.upload_document(&actor, &request.user_id, document_type, upload)
    })
    .await;

    match outcome {
        Ok(result) => respond(StatusCode::CREATED, result),
        Err(join_error) => {
            tracing::error!(error = %join_error, "upload task failed");
            let payload = json!({ "error": "upload task failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

fn decode_upload(request: &UploadRequest) -> Result<(DocumentType, FileUpload), WorkflowError> {
    let document_type = request.document_type.parse::<DocumentType>()?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.content_base64.trim())
        .map_err(|err| {
            WorkflowError::Validation(format!("content_base64 is not valid base64: {err}"))
        })?;
    let content_type = match request.content_type.as_deref() {
        Some(raw) => raw.parse::<mime::Mime>().map_err(|_| {
            WorkflowError::Validation(format!("unrecognized content type '{raw}'"))
        })?,
        None => mime::APPLICATION_OCTET_STREAM,
    };
    Ok((
        document_type,
        FileUpload::new(request.file_name.clone(), content_type, bytes),
    ))
}

pub(crate) async fn accept_document_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(document_id): Path<String>,
    Json(request): Json<DocumentReviewRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = DocumentId(document_id);
    let outcome = workflow
        .resolve_actor(&request.actor_id)
        .and_then(|actor| workflow.accept_document(&actor, &id, request.version));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn refuse_document_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(document_id): Path<String>,
    Json(request): Json<DocumentReviewRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = DocumentId(document_id);
    let outcome = workflow.resolve_actor(&request.actor_id).and_then(|actor| {
        workflow.refuse_document(&actor, &id, &request.reason, request.version)
    });
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn document_url_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(document_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = DocumentId(document_id);
    let outcome = workflow
        .resolve_actor(&query.actor_id)
        .and_then(|actor| workflow.document_url(&actor, &id));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn approve_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(enrollment_id): Path<String>,
    Json(request): Json<EnrollmentDecisionRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = EnrollmentId(enrollment_id);
    let outcome = workflow
        .resolve_actor(&request.actor_id)
        .and_then(|actor| workflow.approve_enrollment(&actor, &id, request.version));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn refuse_enrollment_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(enrollment_id): Path<String>,
    Json(request): Json<EnrollmentDecisionRequest>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = EnrollmentId(enrollment_id);
    let outcome = workflow.resolve_actor(&request.actor_id).and_then(|actor| {
        workflow.refuse_enrollment(&actor, &id, request.version, &request.reason)
    });
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn enrollment_documents_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(enrollment_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let id = EnrollmentId(enrollment_id);
    let outcome = workflow
        .resolve_actor(&query.actor_id)
        .and_then(|actor| workflow.enrollment_documents(&actor, &id));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn checklist_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(user_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let user_id = UserId(user_id);
    let outcome = workflow
        .resolve_actor(&query.actor_id)
        .and_then(|actor| workflow.checklist_for(&actor, &user_id));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn student_overview_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Path(user_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let user_id = UserId(user_id);
    let outcome = workflow
        .resolve_actor(&query.actor_id)
        .and_then(|actor| workflow.student_overview(&actor, &user_id));
    respond(StatusCode::OK, outcome)
}

pub(crate) async fn roster_handler<S, F, E>(
    State(workflow): State<Arc<EnrollmentWorkflow<S, F, E>>>,
    Query(query): Query<ActorQuery>,
) -> Response
where
    S: EntityStore + 'static,
    F: FileStore + 'static,
    E: EventSink + 'static,
{
    let outcome = workflow
        .resolve_actor(&query.actor_id)
        .and_then(|actor| workflow.school_enrollments(&actor));
    respond(StatusCode::OK, outcome)
}
