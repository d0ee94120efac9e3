//! One-call entry point: compile, print, and run a job.

use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use tracing::info;

use crate::cancellation::CancellationToken;
use crate::config::RunConfig;
use crate::errors::Result;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::pipeline::{compile_request, ExecutionController, OperationMonitor, PipelineService, RunOutcome};
use crate::resources::LocationLister;

/// The remote collaborators of a run.
pub struct Clients<'a> {
    /// Starts and cancels operations.
    pub service: &'a dyn PipelineService,
    /// Waits for operations.
    pub monitor: &'a dyn OperationMonitor,
    /// Resolves zone and region prefixes.
    pub lister: &'a dyn LocationLister,
    /// Receives lifecycle events.
    pub events: Arc<dyn EventSink>,
}

impl<'a> Clients<'a> {
    /// Bundles the clients with a no-op event sink.
    #[must_use]
    pub fn new(
        service: &'a dyn PipelineService,
        monitor: &'a dyn OperationMonitor,
        lister: &'a dyn LocationLister,
    ) -> Self {
        Self {
            service,
            monitor,
            lister,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }
}

impl std::fmt::Debug for Clients<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients").finish_non_exhaustive()
    }
}

/// Compiles the configured job, writes the request as indented JSON to
/// `out`, then submits it unless this is a dry run.
///
/// The request is always written before anything is submitted.
pub async fn run_job<W: Write + Send>(
    config: &RunConfig,
    clients: &Clients<'_>,
    token: &CancellationToken,
    out: &mut W,
) -> Result<RunOutcome> {
    let request = compile_request(config, clients.lister).await?;

    writeln!(out, "{}", request.to_pretty_json()?)?;
    out.flush()?;
    clients.events.try_emit(
        events::RUN_REQUEST_BUILT,
        Some(json!({
            "actions": request.pipeline.actions.len(),
            "project": request.pipeline.resources.project_id,
        })),
    );

    if config.is_dry_run() {
        info!("Dry run, not submitting");
        return Ok(RunOutcome::NotSubmitted);
    }

    ExecutionController::new(clients.service, clients.monitor)
        .with_config(config)
        .with_event_sink(Arc::clone(&clients.events))
        .execute(request, token)
        .await
}
