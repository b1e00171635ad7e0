//! Payment processor webhook handler.

use axum::{extract::State, http::StatusCode};

use crate::error::AppError;
use crate::services::reconciler::ReconcileOutcome;
use crate::AppState;

/// Receive one webhook delivery from the processor.
///
/// Benign traffic (health pings, unknown order codes, duplicates) is
/// acknowledged with 200 so the processor stops redelivering; signature
/// mismatches and storage failures surface as errors so it retries.
pub async fn receive(State(state): State<AppState>, body: String) -> Result<StatusCode, AppError> {
    let outcome = state.reconciler.process(&body).await?;

    if let ReconcileOutcome::Applied(status) = outcome {
        tracing::debug!(?status, "webhook transition applied");
    }

    Ok(StatusCode::OK)
}
