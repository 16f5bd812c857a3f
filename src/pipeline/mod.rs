//! The enrichment pipeline core: run controller and reporting

mod controller;
mod report;

pub use controller::{ControllerError, PipelineController};
pub use report::{headline, summarize};
