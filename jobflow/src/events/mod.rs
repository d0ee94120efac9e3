//! Run lifecycle events.
//!
//! The execution controller reports what it does through an [`EventSink`]
//! passed in by the caller. Event names are dotted (`attempt.submitted`)
//! and payloads are JSON objects carrying the operation name, attempt number
//! and preemptible flag where they apply.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// The request was compiled and written out.
pub const RUN_REQUEST_BUILT: &str = "run.request_built";
/// A request was accepted and an operation started.
pub const ATTEMPT_SUBMITTED: &str = "attempt.submitted";
/// An operation finished with an error.
pub const ATTEMPT_FAILED: &str = "attempt.failed";
/// A retriable failure is being resubmitted.
pub const ATTEMPT_RETRYING: &str = "attempt.retrying";
/// The run finished successfully (or was submitted without waiting).
pub const RUN_SUCCEEDED: &str = "run.succeeded";
/// The run failed.
pub const RUN_FAILED: &str = "run.failed";
/// A cancel was sent for a running operation.
pub const OPERATION_CANCEL_REQUESTED: &str = "operation.cancel_requested";
/// The cancel call itself failed.
pub const OPERATION_CANCEL_FAILED: &str = "operation.cancel_failed";
