//! Request assembly and execution.
//!
//! This module provides:
//! - [`RequestAssembler`], which wraps user actions with staging steps and
//!   fills in resources
//! - [`ExecutionController`], which submits, waits and retries
//! - The [`PipelineService`] and [`OperationMonitor`] seams to the remote
//!   service

mod assembler;
mod attempt;
mod controller;
mod service;

pub use assembler::{compile_request, RequestAssembler, COS_IMAGE_FAMILY, STORAGE_SCOPE};
pub use attempt::{AttemptBudget, AttemptDecision, AttemptState};
pub use controller::{ExecutionController, RunOutcome};
pub use service::{OperationMonitor, PipelineService};

#[cfg(test)]
pub use service::{MockOperationMonitor, MockPipelineService};
