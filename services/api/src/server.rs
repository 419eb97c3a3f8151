use crate::cli::ServeArgs;
use crate::infra::{seed_directory, AppState, InMemoryEventSink};
use crate::routes::with_enrollment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use drivehub::config::{AppConfig, AppEnvironment};
use drivehub::error::AppError;
use drivehub::telemetry;
use drivehub::workflows::enrollment::{
    EnrollmentWorkflow, InMemoryEntityStore, LocalFileStore, WorkflowError, WorkflowSettings,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryEntityStore::new());
    if config.environment != AppEnvironment::Production {
        seed_directory(store.as_ref()).map_err(WorkflowError::from)?;
        info!("seeded sample users and schools");
    }

    std::fs::create_dir_all(&config.uploads.root)?;
    let files = Arc::new(LocalFileStore::new(
        config.uploads.root.clone(),
        config.uploads.public_base.clone(),
    ));
    let events = Arc::new(InMemoryEventSink::default());
    let workflow = Arc::new(EnrollmentWorkflow::new(
        store,
        files,
        events,
        WorkflowSettings {
            max_upload_bytes: config.uploads.max_upload_bytes,
        },
    ));

    let app = with_enrollment_routes(workflow)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        uploads = %config.uploads.root.display(),
        "drivehub enrollment service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
