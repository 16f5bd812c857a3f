//! Enrichment run state machine
//!
//! A run progresses `Idle → Running → {Completed | HaltedByRateLimit |
//! HaltedByUser}`. Terminal states record an end timestamp; `Idle` is
//! re-enterable in the sense that a new run may be started for the same
//! pipeline kind after any terminal state.

use crate::types::PipelineKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Run lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunPhase {
    /// No run started yet
    Idle,
    /// Working set is being processed
    Running,
    /// Every item in the working set was visited
    Completed,
    /// Provider throttled the run; stopped early
    HaltedByRateLimit,
    /// Operator requested cancellation
    HaltedByUser,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::HaltedByRateLimit | Self::HaltedByUser
        )
    }
}

/// Pacing and batching options for one run.
///
/// The delays are fixed, not adaptive: the provider's rate limit is assumed
/// static. The lookup client adapter is the extension point for anything
/// smarter.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Items per batch
    pub batch_size: usize,
    /// Sleep between consecutive lookups
    pub inter_call_delay: Duration,
    /// Sleep between consecutive batches
    pub inter_batch_delay: Duration,
    /// Pause after each item's resolution so the outcome can settle in the
    /// operator view before advancing
    pub settle_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: 30,
            inter_call_delay: Duration::from_millis(1500),
            inter_batch_delay: Duration::from_millis(2000),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Running counts, updated after each item resolution
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunTally {
    /// Items visited (succeeded + failed); skipped items do not count
    pub processed: usize,
    /// Items committed to the catalog
    pub succeeded: usize,
    /// Items with no result or a failed commit
    pub failed: usize,
}

/// Final summary of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub halted_by_rate_limit: bool,
    pub halted_by_user: bool,
}

/// One enrichment run over a working set (in-memory state).
///
/// The controller is the only writer; concurrent status reads from the API
/// observe a consistent snapshot through the surrounding `RwLock`.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentRun {
    pub run_id: Uuid,
    pub kind: PipelineKind,
    pub phase: RunPhase,
    pub tally: RunTally,
    /// Size of the working set at run start
    pub total_items: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl EnrichmentRun {
    pub fn new(kind: PipelineKind, total_items: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            phase: RunPhase::Idle,
            tally: RunTally::default(),
            total_items,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new phase, stamping the end time on terminal phases
    pub fn transition_to(&mut self, phase: RunPhase) {
        tracing::debug!(
            run_id = %self.run_id,
            kind = %self.kind,
            old = ?self.phase,
            new = ?phase,
            "Run phase transition"
        );
        self.phase = phase;
        if phase.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn record_success(&mut self) {
        self.tally.processed += 1;
        self.tally.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.tally.processed += 1;
        self.tally.failed += 1;
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Build the final report for the current tally and phase
    pub fn report(&self) -> RunReport {
        RunReport {
            processed: self.tally.processed,
            succeeded: self.tally.succeeded,
            failed: self.tally.failed,
            halted_by_rate_limit: self.phase == RunPhase::HaltedByRateLimit,
            halted_by_user: self.phase == RunPhase::HaltedByUser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_stamp_end_time() {
        let mut run = EnrichmentRun::new(PipelineKind::Isbn, 10);
        assert!(run.ended_at.is_none());

        run.transition_to(RunPhase::Running);
        assert!(run.ended_at.is_none());
        assert!(!run.is_terminal());

        run.transition_to(RunPhase::Completed);
        assert!(run.ended_at.is_some());
        assert!(run.is_terminal());
    }

    #[test]
    fn report_reflects_halt_reason() {
        let mut run = EnrichmentRun::new(PipelineKind::Cover, 5);
        run.transition_to(RunPhase::Running);
        run.record_success();
        run.record_failure();
        run.transition_to(RunPhase::HaltedByRateLimit);

        let report = run.report();
        assert_eq!(report.processed, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.halted_by_rate_limit);
        assert!(!report.halted_by_user);
    }

    #[test]
    fn default_options_match_observed_pacing() {
        let opts = RunOptions::default();
        assert_eq!(opts.batch_size, 30);
        assert_eq!(opts.inter_call_delay, Duration::from_millis(1500));
        assert_eq!(opts.inter_batch_delay, Duration::from_millis(2000));
        assert_eq!(opts.settle_delay, Duration::from_millis(1000));
    }
}
