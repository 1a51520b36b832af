use crate::cli::ServeArgs;
use crate::infra::{open_store, scoring_engine, AppState};
use crate::routes::with_lab_manager_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lab_managers::config::AppConfig;
use lab_managers::error::AppError;
use lab_managers::telemetry;
use lab_managers::workflows::lab_managers::{LabManagerService, MemoryAssignmentStore};
use lab_managers::workflows::snapshot::CsvLabDirectory;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let directory = Arc::new(CsvLabDirectory::new(
        config.lab_managers.snapshot_dir.clone(),
    ));
    let engine = scoring_engine(&config.lab_managers);

    let routes = match config.lab_managers.database_path.as_deref() {
        Some(path) => {
            let store = Arc::new(open_store(path)?);
            info!(database = %path.display(), "using sqlite assignment store");
            with_lab_manager_routes(Arc::new(LabManagerService::new(directory, store, engine)))
        }
        None => {
            warn!("LABMGR_DATABASE_PATH not set; assignments live in memory only");
            let store = Arc::new(MemoryAssignmentStore::new());
            with_lab_manager_routes(Arc::new(LabManagerService::new(directory, store, engine)))
        }
    };

    let app = routes
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        snapshot_dir = %config.lab_managers.snapshot_dir.display(),
        excluded_departments = config.lab_managers.excluded_departments.len(),
        "lab manager service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
