//! Pipeline, resource and request types submitted to the execution service.
//!
//! Field names follow the service's JSON encoding (camelCase) so a request
//! can be printed, edited by hand, and fed back in as a raw request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::action::Action;
use crate::errors::ConfigError;

/// A disk attached to the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Disk name referenced by action mounts.
    pub name: String,
    /// Size in GB; zero leaves the service default.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size_gb: u64,
    /// Disk type, e.g. `pd-ssd`.
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub disk_type: String,
    /// Image pre-loaded onto the disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
}

/// A GPU attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Accelerator {
    /// Accelerator type, e.g. `nvidia-tesla-k80`.
    #[serde(rename = "type")]
    pub accelerator_type: String,
    /// Number of accelerators.
    pub count: u32,
}

/// VPC settings for the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// Network name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Subnetwork name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subnetwork: String,
    /// Whether to avoid a public IP address.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_private_address: bool,
}

/// Service account identity of the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// Account email; empty selects the project default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// OAuth scopes granted to the VM.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// The VM an operation runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    /// Machine type, e.g. `n1-standard-1`.
    #[serde(default)]
    pub machine_type: String,
    /// Whether to use revocable compute.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preemptible: bool,
    /// VM labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Attached disks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    /// Network settings.
    #[serde(default)]
    pub network: Network,
    /// GPUs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accelerators: Vec<Accelerator>,
    /// Service account and scopes.
    #[serde(default)]
    pub service_account: ServiceAccount,
    /// Boot disk size override in GB.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub boot_disk_size_gb: u64,
    /// Boot image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_image: Option<String>,
}

/// Where and as whom an operation runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Target project.
    #[serde(default)]
    pub project_id: String,
    /// Allowed zones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,
    /// Allowed regions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    /// VM description.
    #[serde(default)]
    pub virtual_machine: VirtualMachine,
}

impl Resources {
    /// Checks that zones and regions are not both set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.zones.is_empty() && !self.regions.is_empty() {
            return Err(ConfigError::ConflictingLocations);
        }
        Ok(())
    }
}

/// An ordered sequence of actions plus its environment and resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Actions in execution order.
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Environment shared by all actions.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Compute resources.
    #[serde(default)]
    pub resources: Resources,
    /// Overall timeout, e.g. `"3600s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// The unit submitted to the execution service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The pipeline to run.
    pub pipeline: Pipeline,
    /// Operation labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Request {
    /// Parses a request from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encodes the request as indented JSON.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Sets whether the VM is preemptible.
    pub fn set_preemptible(&mut self, preemptible: bool) {
        self.pipeline.resources.virtual_machine.preemptible = preemptible;
    }

    /// Whether the VM is preemptible.
    #[must_use]
    pub fn is_preemptible(&self) -> bool {
        self.pipeline.resources.virtual_machine.preemptible
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u64) -> bool {
    *value == 0
}
