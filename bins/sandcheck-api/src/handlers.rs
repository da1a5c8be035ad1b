// HTTP route handlers for the Sandcheck API

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use sandcheck_common::types::{ChallengeKind, ChallengeSummary, ErrorResponse, VerifyRequest, VerifyResponse};
use sandcheck_engine::EngineError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::metrics;
use crate::AppState;

/// Error half of every handler; always rendered as `{ "error": ... }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownChallenge(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            EngineError::InvalidChallenge(_) => {
                error!(error = %err, "Challenge definition fault");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

/// GET /challenges/:challenge_id body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDetail {
    #[serde(flatten)]
    pub summary: ChallengeSummary,
    pub description: String,
    pub check_names: Vec<String>,
}

/// POST /verify - Verify a submission against a registered challenge
pub async fn verify_submission(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let max_source_bytes = state.engine.config().max_source_bytes;
    if payload.code.len() > max_source_bytes {
        metrics::record_rejection("oversize");
        warn!(bytes = payload.code.len(), limit = max_source_bytes, "Submission too large");
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("code exceeds the limit of {} bytes", max_source_bytes),
        ));
    }

    let kind = match state.engine.registry().get(&payload.challenge_id) {
        Ok(challenge) => challenge.kind(),
        Err(err) => {
            metrics::record_rejection("unknown_challenge");
            warn!(challenge_id = %payload.challenge_id, "Unknown challenge requested");
            return Err(err.into());
        }
    };

    let submit_only = payload.submit_only;
    let submission = payload.into_submission();
    info!(
        submission_id = %submission.id,
        challenge_id = %submission.challenge_id,
        kind = %kind,
        submit_only,
        "Submission received"
    );

    let started = Instant::now();
    let verdict = state.engine.verify(&submission).await?;
    metrics::record_verification(kind_label(kind), verdict.is_correct, started.elapsed().as_secs_f64());

    info!(
        submission_id = %submission.id,
        passed = verdict.passed_count(),
        total = verdict.total(),
        is_correct = verdict.is_correct,
        "Verdict returned"
    );

    Ok(Json(VerifyResponse::from(verdict)))
}

/// GET /challenges - List registered challenges
pub async fn list_challenges(State(state): State<Arc<AppState>>) -> Json<Vec<ChallengeSummary>> {
    Json(state.engine.registry().summaries())
}

/// GET /challenges/:challenge_id - Describe one challenge
pub async fn get_challenge(
    State(state): State<Arc<AppState>>,
    Path(challenge_id): Path<String>,
) -> Result<Json<ChallengeDetail>, ApiError> {
    let challenge = state.engine.registry().get(&challenge_id)?;
    Ok(Json(ChallengeDetail {
        summary: challenge.summary(),
        description: challenge.description().to_string(),
        check_names: challenge.check_names(),
    }))
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn export_metrics() -> Response {
    match metrics::render() {
        Ok((content_type, body)) => (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response()
        }
    }
}

fn kind_label(kind: ChallengeKind) -> &'static str {
    match kind {
        ChallengeKind::Algorithm => "algorithm",
        ChallengeKind::Ui => "ui",
    }
}
