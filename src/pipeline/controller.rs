//! Pipeline controller
//!
//! Drives one enrichment run to completion, cancellation or rate-limit
//! abort. The controller is strictly sequential: one outstanding lookup at
//! a time, items in working-set order, batches in order. Interruption never
//! corrupts committed catalog state — items committed before a halt stay
//! committed, and completed-but-uncommitted lookups survive in the progress
//! store.

use crate::clients::{LookupClient, LookupError};
use crate::db::books::CatalogRepository;
use crate::db::progress::ProgressStore;
use crate::models::{EnrichmentRun, RunOptions, RunPhase, RunReport};
use crate::types::{ItemOutcome, PipelineKind, RunEvent, WorkItem};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors rejecting a run before any item is processed
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Working-set ids must be unique
    #[error("duplicate work item id in working set: {0}")]
    DuplicateWorkItems(String),

    /// At most one run per pipeline kind at a time
    #[error("a {0} run is already in progress")]
    AlreadyRunning(PipelineKind),
}

/// Per-kind outcome sets retained across runs within one service session.
///
/// Supports safe re-entry: a second run over a working set whose ids were
/// all resolved by a prior run issues zero external calls. Cleared by
/// [`PipelineController::reset_session`] when the operator re-scans.
#[derive(Debug, Default, Clone)]
struct SessionLedger {
    succeeded: HashSet<String>,
    failed: HashSet<String>,
}

/// Working memory for one execution. Created at run start, discarded at run
/// end; only pending results survive through the progress store.
struct RunState {
    in_flight: Option<String>,
    succeeded: HashSet<String>,
    failed: HashSet<String>,
    rate_limited: bool,
    cancel_requested: bool,
}

impl RunState {
    fn seeded_from(ledger: &SessionLedger) -> Self {
        Self {
            in_flight: None,
            succeeded: ledger.succeeded.clone(),
            failed: ledger.failed.clone(),
            rate_limited: false,
            cancel_requested: false,
        }
    }

    fn is_resolved(&self, id: &str) -> bool {
        self.succeeded.contains(id) || self.failed.contains(id)
    }
}

/// Drives enrichment runs. One controller instance serves all three
/// pipeline kinds; adapters are injected.
pub struct PipelineController {
    lookup: Arc<dyn LookupClient>,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressStore>,
    events: broadcast::Sender<RunEvent>,
    ledgers: Mutex<HashMap<PipelineKind, SessionLedger>>,
    running: std::sync::Mutex<HashSet<PipelineKind>>,
}

/// Releases the per-kind running flag on every exit path
struct RunningGuard<'a> {
    controller: &'a PipelineController,
    kind: PipelineKind,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.controller.running.lock() {
            running.remove(&self.kind);
        }
    }
}

impl PipelineController {
    pub fn new(
        lookup: Arc<dyn LookupClient>,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressStore>,
        events: broadcast::Sender<RunEvent>,
    ) -> Self {
        Self {
            lookup,
            catalog,
            progress,
            events,
            ledgers: Mutex::new(HashMap::new()),
            running: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Forget prior outcomes for one pipeline kind. Items marked exhausted
    /// become eligible again on the next run (the operator's re-scan).
    pub async fn reset_session(&self, kind: PipelineKind) {
        self.ledgers.lock().await.remove(&kind);
        debug!(kind = %kind, "Session ledger reset");
    }

    /// Execute one run over `work_set`.
    ///
    /// Cancellation is cooperative: `cancel` is checked at the top of the
    /// batch loop and the top of the item loop, never mid-call. The shared
    /// `run` is the operator-visible status view; this method is its only
    /// writer.
    pub async fn run(
        &self,
        run: Arc<RwLock<EnrichmentRun>>,
        work_set: Vec<WorkItem>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunReport, ControllerError> {
        let (run_id, kind) = {
            let r = run.read().await;
            (r.run_id, r.kind)
        };

        let mut seen = HashSet::new();
        for item in &work_set {
            if !seen.insert(item.id.clone()) {
                return Err(ControllerError::DuplicateWorkItems(item.id.clone()));
            }
        }

        {
            let mut running = self
                .running
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !running.insert(kind) {
                return Err(ControllerError::AlreadyRunning(kind));
            }
        }
        let _guard = RunningGuard {
            controller: self,
            kind,
        };

        let mut state = RunState::seeded_from(
            self.ledgers.lock().await.entry(kind).or_default(),
        );

        run.write().await.transition_to(RunPhase::Running);
        let _ = self.events.send(RunEvent::RunStarted {
            run_id,
            kind,
            total_items: work_set.len(),
        });

        info!(
            run_id = %run_id,
            kind = %kind,
            total_items = work_set.len(),
            batch_size = options.batch_size,
            "Enrichment run started"
        );

        let batch_size = options.batch_size.max(1);
        let batch_count = work_set.len().div_ceil(batch_size);

        'batches: for (batch_idx, batch) in work_set.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                state.cancel_requested = true;
                break 'batches;
            }

            for item in batch {
                if cancel.is_cancelled() {
                    state.cancel_requested = true;
                    break 'batches;
                }

                // Safe re-entry: never reprocess a resolved id
                if state.is_resolved(&item.id) {
                    debug!(run_id = %run_id, item_id = %item.id, "Already resolved, skipping");
                    continue;
                }

                state.in_flight = Some(item.id.clone());
                let _ = self.events.send(RunEvent::ItemStarted {
                    run_id,
                    item_id: item.id.clone(),
                });

                // Resume path: a pending result from an interrupted run is
                // committed without issuing a new external call.
                let pending = match self.progress.get(kind, &item.id).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        warn!(item_id = %item.id, error = %e, "Progress store read failed");
                        None
                    }
                };

                let outcome = if let Some(value) = pending {
                    info!(
                        run_id = %run_id,
                        item_id = %item.id,
                        "Pending result found, committing without lookup"
                    );
                    self.commit(kind, &item.id, &value, &mut state).await
                } else {
                    match self.lookup.lookup(&item.hints).await {
                        Ok(result) => match result.value.filter(|_| result.found) {
                            Some(value) => {
                                // Durable before commit: a crash between here
                                // and the catalog write must not lose the
                                // lookup.
                                if let Err(e) = self.progress.put(kind, &item.id, &value).await {
                                    warn!(item_id = %item.id, error = %e, "Progress store write failed");
                                }
                                self.commit(kind, &item.id, &value, &mut state).await
                            }
                            None => {
                                // Exhausted for this run; a manual re-scan is
                                // required to retry.
                                debug!(run_id = %run_id, item_id = %item.id, "No match from provider");
                                state.failed.insert(item.id.clone());
                                ItemOutcome::NoMatch
                            }
                        },
                        Err(LookupError::RateLimited) => {
                            warn!(
                                run_id = %run_id,
                                item_id = %item.id,
                                "Provider rate limit hit, halting run"
                            );
                            state.rate_limited = true;
                            state.in_flight = None;
                            break 'batches;
                        }
                        Err(e) => {
                            warn!(
                                run_id = %run_id,
                                item_id = %item.id,
                                error = %e,
                                "Lookup failed, treating as no match for this run"
                            );
                            state.failed.insert(item.id.clone());
                            ItemOutcome::LookupFailed
                        }
                    }
                };

                state.in_flight = None;

                {
                    let mut r = run.write().await;
                    if outcome == ItemOutcome::Committed {
                        r.record_success();
                    } else {
                        r.record_failure();
                    }
                }
                let _ = self.events.send(RunEvent::ItemResolved {
                    run_id,
                    item_id: item.id.clone(),
                    outcome,
                });

                // Let the outcome settle in the operator view, then pace the
                // next external call.
                tokio::time::sleep(options.settle_delay).await;
                tokio::time::sleep(options.inter_call_delay).await;
            }

            if batch_idx + 1 < batch_count {
                tokio::time::sleep(options.inter_batch_delay).await;
            }
        }

        debug_assert!(state.in_flight.is_none());

        // Namespace wipe is allowed only when the run drained fully and the
        // store holds nothing pending. Entries left by commit failures or by
        // interrupted runs over a different working set are uncommitted
        // results and must survive.
        if !state.rate_limited && !state.cancel_requested {
            match self.progress.count(kind).await {
                Ok(0) => {
                    if let Err(e) = self.progress.clear(kind).await {
                        warn!(kind = %kind, error = %e, "Progress store clear failed");
                    }
                }
                Ok(remaining) => {
                    debug!(kind = %kind, remaining, "Pending entries remain, keeping namespace");
                }
                Err(e) => warn!(kind = %kind, error = %e, "Progress store count failed"),
            }
        }

        let phase = if state.rate_limited {
            RunPhase::HaltedByRateLimit
        } else if state.cancel_requested {
            RunPhase::HaltedByUser
        } else {
            RunPhase::Completed
        };

        let report = {
            let mut r = run.write().await;
            r.transition_to(phase);
            r.report()
        };

        self.ledgers.lock().await.insert(
            kind,
            SessionLedger {
                succeeded: state.succeeded,
                failed: state.failed,
            },
        );

        info!(
            run_id = %run_id,
            kind = %kind,
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            halted_by_rate_limit = report.halted_by_rate_limit,
            halted_by_user = report.halted_by_user,
            "Enrichment run finished"
        );

        let _ = self.events.send(RunEvent::RunCompleted {
            run_id,
            kind,
            report,
        });

        Ok(report)
    }

    /// Write one approved value through the catalog repository.
    ///
    /// On success the pending entry is evicted — and only then. On failure
    /// the entry is retained for manual resolution.
    async fn commit(
        &self,
        kind: PipelineKind,
        item_id: &str,
        value: &str,
        state: &mut RunState,
    ) -> ItemOutcome {
        match self.catalog.update_field(item_id, kind.target_field(), value).await {
            Ok(()) => {
                state.succeeded.insert(item_id.to_string());
                if let Err(e) = self.progress.delete(kind, item_id).await {
                    warn!(item_id = %item_id, error = %e, "Progress store eviction failed");
                }
                info!(item_id = %item_id, field = kind.target_field(), "Catalog updated");
                ItemOutcome::Committed
            }
            Err(e) => {
                warn!(
                    item_id = %item_id,
                    error = %e,
                    "Commit failed, keeping pending result for manual retry"
                );
                state.failed.insert(item_id.to_string());
                ItemOutcome::CommitFailed
            }
        }
    }
}
