//! Client for the pipelines API: run, cancel and poll operations.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{HttpClient, ServiceEndpoint};
use crate::core::Request;
use crate::errors::{ExecutionError, JobflowError, Result, SubmissionError};
use crate::pipeline::{OperationMonitor, PipelineService};

/// Status codes for which another attempt may succeed: ABORTED (the VM was
/// preempted) and UNAVAILABLE.
const RETRIABLE_CODES: [i32; 2] = [10, 14];

/// The terminal error of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationStatus {
    /// Canonical status code.
    #[serde(default)]
    pub code: i32,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl OperationStatus {
    /// Whether the failure is worth another attempt.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        RETRIABLE_CODES.contains(&self.code)
    }
}

/// A long-running operation as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Operation {
    /// Operation name, e.g. `projects/p/operations/123`.
    #[serde(default)]
    pub name: String,
    /// Whether the operation has finished.
    #[serde(default)]
    pub done: bool,
    /// Set when the operation finished with an error.
    #[serde(default)]
    pub error: Option<OperationStatus>,
}

/// Submits, cancels and watches pipeline operations.
#[derive(Debug, Clone)]
pub struct PipelinesClient {
    http: HttpClient,
    poll_interval: std::time::Duration,
}

impl PipelinesClient {
    /// Creates a client for `endpoint`.
    pub fn new(endpoint: &ServiceEndpoint) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(endpoint)?,
            poll_interval: endpoint.poll_interval,
        })
    }

    /// Fetches the current state of an operation.
    pub async fn get_operation(&self, operation: &str) -> Result<Operation> {
        self.http.get(&format!("v2alpha1/{operation}"), &[]).await
    }
}

#[async_trait]
impl PipelineService for PipelinesClient {
    async fn submit(&self, request: &Request) -> std::result::Result<String, SubmissionError> {
        let operation: Operation = self
            .http
            .post("v2alpha1/pipelines:run", request)
            .await
            .map_err(|e| match e {
                JobflowError::Api { message, body, .. } => {
                    SubmissionError::new(message).with_body(body)
                }
                other => SubmissionError::new(other.to_string()),
            })?;
        debug!(operation = %operation.name, "Pipeline accepted");
        Ok(operation.name)
    }

    async fn cancel(&self, operation: &str) -> Result<()> {
        let _: serde_json::Value = self
            .http
            .post(&format!("v2alpha1/{operation}:cancel"), &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OperationMonitor for PipelinesClient {
    async fn wait(&self, operation: &str) -> std::result::Result<(), ExecutionError> {
        loop {
            let status = self.get_operation(operation).await.map_err(|e| {
                ExecutionError::fatal(operation, format!("polling operation: {e}"))
            })?;

            if status.done {
                return match status.error {
                    None => Ok(()),
                    Some(error) if error.is_retriable() => {
                        Err(ExecutionError::retriable(operation, error.message))
                    }
                    Some(error) => Err(ExecutionError::fatal(operation, error.message)),
                };
            }

            debug!(operation = %operation, "Operation still running");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
