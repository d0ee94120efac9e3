//! Seams to the remote execution service.

use async_trait::async_trait;

use crate::core::Request;
use crate::errors::{ExecutionError, JobflowError, SubmissionError};

/// Starts and cancels remote operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Submits a request and returns the operation name.
    async fn submit(&self, request: &Request) -> Result<String, SubmissionError>;

    /// Requests cancellation of a running operation.
    async fn cancel(&self, operation: &str) -> Result<(), JobflowError>;
}

/// Waits for a remote operation to reach a terminal state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperationMonitor: Send + Sync {
    /// Resolves once the operation is done; errors carry retriability.
    async fn wait(&self, operation: &str) -> Result<(), ExecutionError>;
}
