//! Enrichment run API handlers
//!
//! POST /enrich/{kind}/start, POST /enrich/{kind}/cancel,
//! POST /enrich/{kind}/reset, GET /enrich/{kind}/status

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{EnrichmentRun, RunPhase, RunTally};
use crate::pipeline;
use crate::types::PipelineKind;
use crate::{ActiveRun, AppState};

/// POST /enrich/{kind}/start request (all fields optional)
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    /// Working-set cap; defaults to the configured candidate limit
    pub limit: Option<usize>,
    pub batch_size: Option<usize>,
    pub inter_call_delay_ms: Option<u64>,
    pub inter_batch_delay_ms: Option<u64>,
    pub settle_delay_ms: Option<u64>,
}

/// POST /enrich/{kind}/start response
#[derive(Debug, Serialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub kind: PipelineKind,
    pub total_items: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /enrich/{kind}/status response
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub run_id: Uuid,
    pub kind: PipelineKind,
    pub phase: RunPhase,
    pub tally: RunTally,
    pub total_items: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Operator-facing summary, present once the run has ended
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// POST /enrich/{kind}/cancel response
#[derive(Debug, Serialize)]
pub struct CancelRunResponse {
    pub run_id: Uuid,
    pub kind: PipelineKind,
    pub cancel_requested: bool,
}

fn parse_kind(kind: &str) -> ApiResult<PipelineKind> {
    kind.parse::<PipelineKind>().map_err(ApiError::BadRequest)
}

/// POST /enrich/{kind}/start
///
/// Build the working set for one pipeline kind and launch a run over it in
/// the background. Returns 409 Conflict while a run for the same kind is
/// still in progress.
pub async fn start_run(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    request: Option<Json<StartRunRequest>>,
) -> ApiResult<Json<StartRunResponse>> {
    let kind = parse_kind(&kind)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let controller = state
        .controllers
        .get(&kind)
        .cloned()
        .ok_or_else(|| ApiError::Internal(format!("No controller for kind {}", kind)))?;

    let limit = request.limit.unwrap_or(state.config.candidate_limit);
    let work_set = state
        .catalog
        .list_candidates(kind, limit)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to build working set: {}", e)))?;

    let mut options = state.config.run_options();
    if let Some(size) = request.batch_size {
        options.batch_size = size;
    }
    if let Some(ms) = request.inter_call_delay_ms {
        options.inter_call_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = request.inter_batch_delay_ms {
        options.inter_batch_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = request.settle_delay_ms {
        options.settle_delay = Duration::from_millis(ms);
    }

    let run = EnrichmentRun::new(kind, work_set.len());
    let response = StartRunResponse {
        run_id: run.run_id,
        kind,
        total_items: run.total_items,
        started_at: run.started_at,
    };

    let run = Arc::new(RwLock::new(run));
    let cancel = CancellationToken::new();

    // Check and insert under one write guard: two concurrent starts for the
    // same kind must never both register, or the loser's Idle run would
    // shadow the winner's and wedge the kind.
    {
        let mut runs = state.runs.write().await;
        if let Some(active) = runs.get(&kind) {
            if !active.run.read().await.is_terminal() {
                return Err(ApiError::Conflict(format!(
                    "A {} run is already in progress",
                    kind
                )));
            }
        }
        runs.insert(
            kind,
            ActiveRun {
                run: run.clone(),
                cancel: cancel.clone(),
            },
        );
    }

    let run_id = response.run_id;
    let runs = state.runs.clone();
    let run_for_task = run.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.run(run_for_task, work_set, options, cancel).await {
            tracing::error!(run_id = %run_id, error = %e, "Enrichment run rejected");

            // Drop the registration of a run that never started, but only
            // if a later start has not already replaced it
            let mut runs = runs.write().await;
            let is_ours = match runs.get(&kind) {
                Some(active) => active.run.read().await.run_id == run_id,
                None => false,
            };
            if is_ours {
                runs.remove(&kind);
            }
        }
    });

    tracing::info!(
        run_id = %response.run_id,
        kind = %kind,
        total_items = response.total_items,
        "Enrichment run launched"
    );

    Ok(Json(response))
}

/// POST /enrich/{kind}/cancel
///
/// Request cooperative cancellation of the tracked run. The run stops at the
/// next loop boundary; cancelling an already-finished run is a no-op.
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<CancelRunResponse>> {
    let kind = parse_kind(&kind)?;

    let runs = state.runs.read().await;
    let active = runs
        .get(&kind)
        .ok_or_else(|| ApiError::NotFound(format!("No {} run to cancel", kind)))?;

    active.cancel.cancel();
    let run = active.run.read().await;

    tracing::info!(run_id = %run.run_id, kind = %kind, "Run cancellation requested");

    Ok(Json(CancelRunResponse {
        run_id: run.run_id,
        kind,
        cancel_requested: true,
    }))
}

/// GET /enrich/{kind}/status
///
/// Snapshot of the most recent run for one pipeline kind.
pub async fn run_status(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<RunStatusResponse>> {
    let kind = parse_kind(&kind)?;

    let runs = state.runs.read().await;
    let active = runs
        .get(&kind)
        .ok_or_else(|| ApiError::NotFound(format!("No {} run found", kind)))?;

    let run = active.run.read().await;
    let summary = run
        .is_terminal()
        .then(|| pipeline::summarize(&run.report()));

    Ok(Json(RunStatusResponse {
        run_id: run.run_id,
        kind,
        phase: run.phase,
        tally: run.tally,
        total_items: run.total_items,
        started_at: run.started_at,
        ended_at: run.ended_at,
        summary,
    }))
}

/// POST /enrich/{kind}/reset
///
/// Forget prior outcomes for one pipeline kind so exhausted items become
/// eligible again. Rejected with 409 while a run for the kind is active.
pub async fn reset_session(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let kind = parse_kind(&kind)?;

    {
        let runs = state.runs.read().await;
        if let Some(active) = runs.get(&kind) {
            if !active.run.read().await.is_terminal() {
                return Err(ApiError::Conflict(format!(
                    "Cannot reset while a {} run is in progress",
                    kind
                )));
            }
        }
    }

    let controller = state
        .controllers
        .get(&kind)
        .ok_or_else(|| ApiError::Internal(format!("No controller for kind {}", kind)))?;
    controller.reset_session(kind).await;

    tracing::info!(kind = %kind, "Session reset");

    Ok(Json(serde_json::json!({ "kind": kind, "reset": true })))
}
