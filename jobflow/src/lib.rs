//! # Jobflow
//!
//! Compiles shell-style job descriptions into remote pipeline requests and
//! drives their execution on preemptible-first compute.
//!
//! A run goes through two phases:
//!
//! - **Compilation**: a command line, a script, a JSON action array or a raw
//!   request is turned into one [`core::Request`]. Inputs are staged onto the
//!   working disk, outputs are copied back, zones and regions are expanded,
//!   and VM resources are filled in from the [`config::RunConfig`].
//! - **Execution**: the request is submitted, watched, and resubmitted on
//!   retriable failures until the attempt budget is spent. Interrupts issue a
//!   best-effort cancel of the running operation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jobflow::prelude::*;
//!
//! let config = RunConfig::new("my-project")
//!     .with_command("gsutil cat ${INPUT0} | wc -l > ${OUTPUT0}")
//!     .with_inputs(["gs://bucket/data.txt"])
//!     .with_outputs(["gs://bucket/count.txt"]);
//!
//! let pipelines = PipelinesClient::new(&ServiceEndpoint::new(genomics_url).with_bearer_token(token))?;
//! let compute = ComputeClient::new(&ServiceEndpoint::new(compute_url).with_bearer_token(token))?;
//! let token = std::sync::Arc::new(CancellationToken::new());
//! token.cancel_on_interrupt();
//!
//! let clients = Clients::new(&pipelines, &pipelines, &compute);
//! let outcome = run_job(&config, &clients, &token, &mut std::io::stdout()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod localization;
pub mod observability;
pub mod pipeline;
pub mod resources;
pub mod runner;
pub mod script;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{ComputeClient, PipelinesClient, ServiceEndpoint};
    pub use crate::config::RunConfig;
    pub use crate::core::{Action, ActionFlag, Mount, Pipeline, Request};
    pub use crate::errors::{
        ConfigError, ExecutionError, JobflowError, ParseError, SubmissionError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::localization::{LocalizationPlan, LocalizationPlanner};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        compile_request, AttemptBudget, ExecutionController, OperationMonitor, PipelineService,
        RequestAssembler, RunOutcome,
    };
    pub use crate::resources::{LocationLister, Locations};
    pub use crate::runner::{run_job, Clients};
    pub use crate::script::{ParsedScript, ScriptParser, ScriptSource};
}
