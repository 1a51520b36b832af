use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::directory::LabDirectory;
use super::domain::{JobCodes, LabId, Uniqname};
use super::repository::{AssignmentStore, RepositoryError};
use super::service::{LabManagerService, LabManagerServiceError};

/// Body accepted by the verification endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationRequest {
    pub is_verified: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body accepted by the ad-hoc scoring endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoreRequest {
    pub role: String,
    #[serde(default)]
    pub job_codes: Vec<String>,
}

/// Query accepted by the assignment listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ManagerListQuery {
    #[serde(default)]
    pub verified: Option<bool>,
}

/// Router builder exposing recompute, lookup, and verification endpoints.
pub fn lab_manager_router<D, S>(service: Arc<LabManagerService<D, S>>) -> Router
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    Router::new()
        .route("/api/v1/lab-managers", get(list_handler::<D, S>))
        .route(
            "/api/v1/lab-managers/recompute",
            post(recompute_all_handler::<D, S>),
        )
        .route("/api/v1/lab-managers/score", post(score_handler::<D, S>))
        .route(
            "/api/v1/labs/:lab_id/managers",
            get(managers_handler::<D, S>),
        )
        .route(
            "/api/v1/labs/:lab_id/managers/recompute",
            post(recompute_lab_handler::<D, S>),
        )
        .route(
            "/api/v1/labs/:lab_id/managers/preview",
            get(preview_handler::<D, S>),
        )
        .route(
            "/api/v1/labs/:lab_id/managers/:uniqname/verification",
            put(verification_handler::<D, S>),
        )
        .with_state(service)
}

pub(crate) async fn recompute_all_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    match run_blocking(service, |service| service.recompute_all()).await {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn recompute_lab_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    Path(lab_id): Path<String>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let lab_id = LabId(lab_id);
    match run_blocking(service, move |service| service.recompute_lab(&lab_id)).await {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn list_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    Query(query): Query<ManagerListQuery>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    match run_blocking(service, |service| service.all_managers()).await {
        Ok(managers) => {
            let managers: Vec<_> = managers
                .into_iter()
                .filter(|row| query.verified.map_or(true, |wanted| row.is_verified == wanted))
                .collect();
            (StatusCode::OK, axum::Json(managers)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn managers_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    Path(lab_id): Path<String>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let lab_id = LabId(lab_id);
    let lookup = lab_id.clone();
    match run_blocking(service, move |service| service.managers_for_lab(&lookup)).await {
        Ok(managers) => {
            let payload = json!({
                "lab_id": lab_id,
                "managers": managers,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(response) => response,
    }
}

pub(crate) async fn preview_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    Path(lab_id): Path<String>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let lab_id = LabId(lab_id);
    match run_blocking(service, move |service| service.preview_lab(&lab_id)).await {
        Ok(decision) => (StatusCode::OK, axum::Json(decision)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn verification_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    Path((lab_id, uniqname)): Path<(String, String)>,
    axum::Json(request): axum::Json<VerificationRequest>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let verified = run_blocking(service, move |service| {
        service.verify_manager(
            &LabId(lab_id),
            &Uniqname(uniqname),
            request.is_verified,
            request.notes,
        )
    })
    .await;
    match verified {
        Ok(assignment) => (StatusCode::OK, axum::Json(assignment)).into_response(),
        Err(response) => response,
    }
}

pub(crate) async fn score_handler<D, S>(
    State(service): State<Arc<LabManagerService<D, S>>>,
    axum::Json(request): axum::Json<ScoreRequest>,
) -> Response
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
{
    let job_codes: JobCodes = request.job_codes.iter().collect();
    let payload = match service.score_role(&request.role, &job_codes) {
        Some(matched) => json!({
            "matched": true,
            "confidence_score": matched.score,
            "detection_reason": matched.reason,
            "rule_index": matched.rule_index,
        }),
        None => json!({ "matched": false }),
    };
    (StatusCode::OK, axum::Json(payload)).into_response()
}

/// Runs a service call on the blocking pool; directory reads, store transactions and
/// recompute lock waits never park a runtime worker.
async fn run_blocking<D, S, T, F>(
    service: Arc<LabManagerService<D, S>>,
    work: F,
) -> Result<T, Response>
where
    D: LabDirectory + 'static,
    S: AssignmentStore + 'static,
    T: Send + 'static,
    F: FnOnce(&LabManagerService<D, S>) -> Result<T, LabManagerServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(error_response(err)),
        Err(join_error) => {
            error!(error = %join_error, "lab manager task failed");
            let payload = json!({ "error": "lab manager task failed" });
            Err((StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response())
        }
    }
}

fn error_response(err: LabManagerServiceError) -> Response {
    let status = match &err {
        LabManagerServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        LabManagerServiceError::Repository(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        LabManagerServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
