//! Run configuration.
//!
//! A [`RunConfig`] is built once (from JSON or with the `with_*` builders)
//! and passed by reference to every stage of the compiler and to the
//! execution controller. Nothing reads configuration from global state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::{ConfigError, JobflowError};

/// Everything that shapes one compiled request and its execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Target project.
    pub project: String,
    /// Optional name, applied as the `name` operation label.
    pub name: Option<String>,
    /// A single command line to execute.
    pub command: Option<String>,
    /// Path of a script, action array or raw request (`-` for stdin).
    pub script: Option<String>,
    /// Objects to localize, as `[NAME=]path` specifiers.
    pub inputs: Vec<String>,
    /// Destinations to delocalize to, as `[NAME=]path` specifiers.
    pub outputs: Vec<String>,
    /// Extra environment variables for every action.
    pub environment: BTreeMap<String, String>,
    /// Operation labels.
    pub labels: BTreeMap<String, String>,
    /// VM labels.
    pub vm_labels: BTreeMap<String, String>,
    /// Additional API scopes for the VM service account.
    pub scopes: Vec<String>,
    /// Zone names or prefixes (e.g. `us-*`).
    pub zones: Vec<String>,
    /// Region names or prefixes (e.g. `us-*`).
    pub regions: Vec<String>,
    /// Storage path the combined pipeline log is copied to.
    pub output: Option<String>,
    /// How often to upload the log while the pipeline runs.
    #[serde(with = "duration_string")]
    pub output_interval: Option<Duration>,
    /// Print the request without running it.
    pub dry_run: bool,
    /// Wait for the operation to finish.
    #[serde(default = "default_true")]
    pub wait: bool,
    /// Machine type to create.
    #[serde(default = "default_machine_type")]
    pub machine_type: String,
    /// Working disk size override in GB (zero keeps the service default).
    pub disk_size_gb: u64,
    /// Working disk type.
    pub disk_type: String,
    /// Image pre-loaded onto the working disk.
    pub disk_image: Option<String>,
    /// Boot disk size in GB (zero keeps the service default).
    pub boot_disk_size_gb: u64,
    /// Use a private IP address.
    pub private_address: bool,
    /// Image used for cloud CLI commands and staging steps.
    #[serde(default = "default_cloud_sdk_image")]
    pub cloud_sdk_image: String,
    /// Image used to mount buckets.
    #[serde(default = "default_fuse_image")]
    pub fuse_image: String,
    /// Image providing the debug ssh server.
    #[serde(default = "default_debug_image")]
    pub debug_image: String,
    /// How long the service waits before abandoning the operation.
    #[serde(with = "duration_string")]
    pub timeout: Option<Duration>,
    /// Default image for script commands.
    #[serde(default = "default_image")]
    pub image: String,
    /// Attempts on non-preemptible compute.
    pub attempts: u32,
    /// Attempts on preemptible compute, used first.
    #[serde(default = "default_pvm_attempts")]
    pub pvm_attempts: u32,
    /// Number of GPUs to attach.
    pub gpus: u32,
    /// GPU type to attach.
    #[serde(default = "default_gpu_type")]
    pub gpu_type: String,
    /// Mount remote inputs with FUSE instead of copying them.
    pub fuse: bool,
    /// Start a debug ssh server alongside the job.
    pub ssh: bool,
    /// VPC network.
    pub network: Option<String>,
    /// VPC subnetwork.
    pub subnetwork: Option<String>,
    /// Run every action in a shared PID namespace.
    pub share_pids: bool,
    /// Container-optimized OS release channel for the boot image.
    pub cos_channel: Option<String>,
    /// Service account email for the VM.
    pub service_account: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_machine_type() -> String {
    "n1-standard-1".to_string()
}

fn default_cloud_sdk_image() -> String {
    "gcr.io/cloud-genomics-pipelines/io".to_string()
}

fn default_fuse_image() -> String {
    "gcr.io/cloud-genomics-pipelines/gcsfuse".to_string()
}

fn default_debug_image() -> String {
    "gcr.io/cloud-genomics-pipelines/tools".to_string()
}

fn default_image() -> String {
    "bash".to_string()
}

fn default_pvm_attempts() -> u32 {
    1
}

fn default_gpu_type() -> String {
    "nvidia-tesla-k80".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            name: None,
            command: None,
            script: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            environment: BTreeMap::new(),
            labels: BTreeMap::new(),
            vm_labels: BTreeMap::new(),
            scopes: Vec::new(),
            zones: Vec::new(),
            regions: Vec::new(),
            output: None,
            output_interval: None,
            dry_run: false,
            wait: default_true(),
            machine_type: default_machine_type(),
            disk_size_gb: 0,
            disk_type: String::new(),
            disk_image: None,
            boot_disk_size_gb: 0,
            private_address: false,
            cloud_sdk_image: default_cloud_sdk_image(),
            fuse_image: default_fuse_image(),
            debug_image: default_debug_image(),
            timeout: None,
            image: default_image(),
            attempts: 0,
            pvm_attempts: default_pvm_attempts(),
            gpus: 0,
            gpu_type: default_gpu_type(),
            fuse: false,
            ssh: false,
            network: None,
            subnetwork: None,
            share_pids: false,
            cos_channel: None,
            service_account: None,
        }
    }
}

impl RunConfig {
    /// Creates a configuration with defaults for the given project.
    #[must_use]
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Self::default()
        }
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, JobflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, JobflowError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks settings that cannot be combined.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.zones.is_empty() && !self.regions.is_empty() {
            return Err(ConfigError::ConflictingLocations);
        }
        if self.gpus > 0 && self.gpu_type.is_empty() {
            return Err(ConfigError::Invalid("gpus requested without a gpu type".to_string()));
        }
        Ok(())
    }

    /// Total number of submissions the run may make.
    #[must_use]
    pub fn attempt_budget(&self) -> u32 {
        self.pvm_attempts.saturating_add(self.attempts)
    }

    /// Whether the request should only be printed.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run || self.attempt_budget() == 0
    }

    /// Sets the command line.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Sets the script path.
    #[must_use]
    pub fn with_script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// Sets the input specifiers.
    #[must_use]
    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the output specifiers.
    #[must_use]
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the zone names or prefixes.
    #[must_use]
    pub fn with_zones(mut self, zones: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.zones = zones.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the region names or prefixes.
    #[must_use]
    pub fn with_regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attempt budgets.
    #[must_use]
    pub fn with_attempts(mut self, preemptible: u32, standard: u32) -> Self {
        self.pvm_attempts = preemptible;
        self.attempts = standard;
        self
    }

    /// Sets the log destination.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Adds an operation label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Sets the overall timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets whether to wait for completion.
    #[must_use]
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }
}

/// Durations encoded as `"90s"`-style strings.
mod duration_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    use crate::script::{format_seconds, parse_duration};

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(duration) => serializer.serialize_str(&format_seconds(*duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.is_empty() => parse_duration(&s)
                .map(|d| (!d.is_zero()).then_some(d))
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
