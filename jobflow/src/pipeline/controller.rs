//! Submission, waiting and retry of a compiled request.
//!
//! Each attempt moves through SUBMIT -> RUNNING -> {SUCCESS, RETRY, FAILURE}.
//! Attempts are strictly sequential; the only field changed between them is
//! the VM's preemptible flag.

use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::attempt::{AttemptBudget, AttemptDecision, AttemptState};
use super::service::{OperationMonitor, PipelineService};
use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::core::Request;
use crate::errors::{ExecutionError, JobflowError, Result};
use crate::events::{self, EventSink, NoOpEventSink};

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The budget allowed no submissions.
    NotSubmitted,
    /// Submitted without waiting for completion.
    Submitted {
        /// The remote operation name.
        operation: String,
        /// The 1-based attempt number.
        attempt: u32,
    },
    /// The operation finished successfully.
    Succeeded {
        /// The remote operation name.
        operation: String,
        /// The 1-based attempt number.
        attempt: u32,
    },
}

/// Drives a request through submission attempts.
pub struct ExecutionController<'a> {
    service: &'a dyn PipelineService,
    monitor: &'a dyn OperationMonitor,
    events: Arc<dyn EventSink>,
    budget: AttemptBudget,
    wait: bool,
    output: Option<String>,
}

impl std::fmt::Debug for ExecutionController<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("budget", &self.budget)
            .field("wait", &self.wait)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl<'a> ExecutionController<'a> {
    /// Creates a controller with one preemptible attempt that waits for
    /// completion.
    #[must_use]
    pub fn new(service: &'a dyn PipelineService, monitor: &'a dyn OperationMonitor) -> Self {
        Self {
            service,
            monitor,
            events: Arc::new(NoOpEventSink),
            budget: AttemptBudget::new(1, 0),
            wait: true,
            output: None,
        }
    }

    /// Takes the budget, wait flag and log destination from `config`.
    #[must_use]
    pub fn with_config(self, config: &RunConfig) -> Self {
        Self {
            budget: AttemptBudget::from_config(config),
            wait: config.wait,
            output: config.output.clone(),
            ..self
        }
    }

    /// Sets the attempt budget.
    #[must_use]
    pub fn with_budget(mut self, budget: AttemptBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Sets whether to wait for each operation to finish.
    #[must_use]
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the sink that receives lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Runs `request` until it succeeds, fails fatally, or the budget runs
    /// out.
    ///
    /// Submission errors are returned immediately. Cancelling `token` while
    /// an operation runs sends one best-effort cancel for it; the wait then
    /// continues until the service reports the operation finished.
    pub async fn execute(
        &self,
        mut request: Request,
        token: &CancellationToken,
    ) -> Result<RunOutcome> {
        if self.budget.is_empty() {
            info!("Attempt budget is zero, not submitting");
            return Ok(RunOutcome::NotSubmitted);
        }

        let mut state = AttemptState::new(self.budget);
        loop {
            let attempt = state.attempt;
            let preemptible = state.is_preemptible();
            request.set_preemptible(preemptible);

            let operation = match self.service.submit(&request).await {
                Ok(operation) => operation,
                Err(e) => {
                    self.emit_failure(attempt, &e.to_string());
                    return Err(e.into());
                }
            };

            info!(
                operation = %operation,
                attempt,
                preemptible,
                "Pipeline running as {operation:?} (attempt: {attempt}, preemptible: {preemptible})"
            );
            if let Some(ref output) = self.output {
                info!("Output will be written to {output:?}");
            }
            let payload = json!({
                "operation": operation,
                "attempt": attempt,
                "preemptible": preemptible,
            });
            self.events.try_emit(events::ATTEMPT_SUBMITTED, Some(payload.clone()));

            if !self.wait {
                self.events.try_emit(events::RUN_SUCCEEDED, Some(payload));
                return Ok(RunOutcome::Submitted { operation, attempt });
            }

            let err = match self.wait_with_cancel(&operation, token).await {
                Ok(()) => {
                    self.events.try_emit(events::RUN_SUCCEEDED, Some(payload));
                    return Ok(RunOutcome::Succeeded { operation, attempt });
                }
                Err(err) => err,
            };

            self.events.try_emit(
                events::ATTEMPT_FAILED,
                Some(json!({
                    "operation": operation,
                    "attempt": attempt,
                    "retriable": err.is_retriable(),
                    "message": err.message,
                })),
            );

            let err = match state.after_failure(err.is_retriable()) {
                AttemptDecision::Retry if token.is_cancelled() => {
                    info!(operation = %operation, "Run cancelled, not retrying");
                    ExecutionError::fatal(err.operation, err.message)
                }
                AttemptDecision::Retry => {
                    warn!(operation = %operation, attempt, "Execution failed: {err}");
                    self.events.try_emit(
                        events::ATTEMPT_RETRYING,
                        Some(json!({
                            "attempt": state.attempt,
                            "preemptible": state.is_preemptible(),
                        })),
                    );
                    continue;
                }
                AttemptDecision::Fail => err,
                AttemptDecision::Exhausted => err.exhausted(self.budget.total()),
            };
            self.emit_failure(attempt, &err.to_string());
            return Err(JobflowError::Execution(err));
        }
    }

    /// Waits for `operation`, issuing one cancel if `token` fires meanwhile.
    async fn wait_with_cancel(
        &self,
        operation: &str,
        token: &CancellationToken,
    ) -> std::result::Result<(), ExecutionError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let registration = token.on_cancel(move || {
            let _ = tx.send(());
        });

        let wait = self.monitor.wait(operation);
        tokio::pin!(wait);
        let mut cancel_sent = false;
        let result = loop {
            tokio::select! {
                result = &mut wait => break result,
                Some(()) = rx.recv(), if !cancel_sent => {
                    cancel_sent = true;
                    self.request_cancel(operation).await;
                }
            }
        };

        drop(registration);
        result
    }

    async fn request_cancel(&self, operation: &str) {
        info!(operation = %operation, "Cancelling operation...");
        self.events.try_emit(
            events::OPERATION_CANCEL_REQUESTED,
            Some(json!({ "operation": operation })),
        );
        if let Err(e) = self.service.cancel(operation).await {
            warn!(operation = %operation, error = %e, "Failed to cancel operation");
            self.events.try_emit(
                events::OPERATION_CANCEL_FAILED,
                Some(json!({ "operation": operation, "message": e.to_string() })),
            );
        }
    }

    fn emit_failure(&self, attempt: u32, message: &str) {
        self.events.try_emit(
            events::RUN_FAILED,
            Some(json!({ "attempt": attempt, "message": message })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SubmissionError;
    use crate::events::CollectingEventSink;
    use crate::pipeline::service::{MockOperationMonitor, MockPipelineService};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn recording_service(seen: &Arc<Mutex<Vec<bool>>>) -> MockPipelineService {
        let seen = Arc::clone(seen);
        let mut service = MockPipelineService::new();
        service.expect_submit().returning(move |request| {
            let mut seen = seen.lock();
            seen.push(request.is_preemptible());
            Ok(format!("operations/{}", seen.len()))
        });
        service
    }

    fn failing_monitor(retriable: bool) -> MockOperationMonitor {
        let mut monitor = MockOperationMonitor::new();
        monitor.expect_wait().returning(move |operation| {
            Err(ExecutionError {
                operation: operation.to_string(),
                message: "preempted".to_string(),
                retriable,
            })
        });
        monitor
    }

    #[tokio::test]
    async fn test_retriable_failures_spend_whole_budget() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = recording_service(&seen);
        let monitor = failing_monitor(true);
        let sink = Arc::new(CollectingEventSink::new());

        let err = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(2, 1))
            .with_event_sink(sink.clone())
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(*seen.lock(), vec![true, true, false]);
        match err {
            JobflowError::Execution(e) => {
                assert!(!e.is_retriable());
                assert_eq!(e.operation, "operations/3");
                assert!(e.message.contains("exhausted"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sink.events_of_type(events::ATTEMPT_RETRYING).len(), 2);
        assert_eq!(sink.events_of_type(events::RUN_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn test_standard_only_budget() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = recording_service(&seen);
        let monitor = failing_monitor(true);

        let _ = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(0, 2))
            .execute(Request::default(), &CancellationToken::new())
            .await;

        assert_eq!(*seen.lock(), vec![false, false]);
    }

    #[tokio::test]
    async fn test_fatal_failure_not_retried() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = recording_service(&seen);
        let monitor = failing_monitor(false);

        let err = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(3, 3))
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(seen.lock().len(), 1);
        assert!(matches!(err, JobflowError::Execution(ref e) if e.message == "preempted"));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = recording_service(&seen);
        let mut monitor = MockOperationMonitor::new();
        monitor
            .expect_wait()
            .withf(|operation| operation == "operations/1")
            .returning(|op| Err(ExecutionError::retriable(op, "preempted")));
        monitor
            .expect_wait()
            .withf(|operation| operation == "operations/2")
            .returning(|_| Ok(()));

        let outcome = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(1, 1))
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Succeeded {
                operation: "operations/2".to_string(),
                attempt: 2
            }
        );
        assert_eq!(*seen.lock(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_submission_error_is_fatal() {
        let mut service = MockPipelineService::new();
        service
            .expect_submit()
            .times(1)
            .returning(|_| Err(SubmissionError::new("quota exceeded")));
        let mut monitor = MockOperationMonitor::new();
        monitor.expect_wait().never();

        let err = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(2, 2))
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, JobflowError::Submission(_)));
    }

    #[tokio::test]
    async fn test_no_wait_returns_after_submission() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = recording_service(&seen);
        let mut monitor = MockOperationMonitor::new();
        monitor.expect_wait().never();

        let outcome = ExecutionController::new(&service, &monitor)
            .with_config(&RunConfig::new("p").with_wait(false))
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Submitted {
                operation: "operations/1".to_string(),
                attempt: 1
            }
        );
    }

    #[tokio::test]
    async fn test_zero_budget_never_submits() {
        let mut service = MockPipelineService::new();
        service.expect_submit().never();
        let monitor = MockOperationMonitor::new();

        let outcome = ExecutionController::new(&service, &monitor)
            .with_budget(AttemptBudget::new(0, 0))
            .execute(Request::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::NotSubmitted);
    }

    /// Finishes shortly after being asked, reporting a cancelled operation.
    struct SlowMonitor;

    #[async_trait]
    impl OperationMonitor for SlowMonitor {
        async fn wait(&self, operation: &str) -> std::result::Result<(), ExecutionError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(ExecutionError::retriable(operation, "cancelled"))
        }
    }

    #[tokio::test]
    async fn test_interrupt_sends_one_cancel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut service = recording_service(&seen);
        service
            .expect_cancel()
            .withf(|operation| operation == "operations/1")
            .times(1)
            .returning(|_| Ok(()));
        let token = CancellationToken::new();
        token.cancel("interrupted");
        let sink = Arc::new(CollectingEventSink::new());

        let err = ExecutionController::new(&service, &SlowMonitor)
            .with_budget(AttemptBudget::new(1, 1))
            .with_event_sink(sink.clone())
            .execute(Request::default(), &token)
            .await
            .unwrap_err();

        assert_eq!(seen.lock().len(), 1);
        assert!(matches!(err, JobflowError::Execution(ref e) if !e.is_retriable()));
        assert_eq!(token.registered(), 0);
        assert_eq!(
            sink.events_of_type(events::OPERATION_CANCEL_REQUESTED).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_failure_is_swallowed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut service = recording_service(&seen);
        service.expect_cancel().times(1).returning(|_| {
            Err(JobflowError::Api {
                status: 500,
                message: "backend error".to_string(),
                body: String::new(),
            })
        });
        let token = CancellationToken::new();
        token.cancel("interrupted");
        let sink = Arc::new(CollectingEventSink::new());

        let err = ExecutionController::new(&service, &SlowMonitor)
            .with_event_sink(sink.clone())
            .execute(Request::default(), &token)
            .await
            .unwrap_err();

        assert!(matches!(err, JobflowError::Execution(ref e) if e.message.contains("cancelled")));
        assert_eq!(sink.events_of_type(events::OPERATION_CANCEL_FAILED).len(), 1);
    }
}
