//! HTTP API handlers

pub mod enrich;
pub mod health;
pub mod sse;
