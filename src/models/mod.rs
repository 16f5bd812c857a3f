//! Domain models for enrichment runs

mod run;

pub use run::{EnrichmentRun, RunOptions, RunPhase, RunReport, RunTally};
