//! The containerized step type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::flags::ActionFlag;

/// Disk name of the working root disk attached to every generated action.
pub const WORKING_DISK: &str = "google";

/// Mount path of the working root disk inside each container.
pub const WORKING_MOUNT_PATH: &str = "/mnt/google";

/// Marker value for a PID namespace shared by all actions.
pub const SHARED_PID_NAMESPACE: &str = "shared";

/// A disk mounted into an action's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mount {
    /// The name of the VM disk.
    pub disk: String,
    /// Where the disk appears inside the container.
    pub path: String,
    /// Whether the mount is read-only.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl Mount {
    /// Creates a read-write mount.
    #[must_use]
    pub fn new(disk: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            disk: disk.into(),
            path: path.into(),
            read_only: false,
        }
    }

    /// The working root disk at its fixed mount path.
    #[must_use]
    pub fn working_root() -> Self {
        Self::new(WORKING_DISK, WORKING_MOUNT_PATH)
    }
}

/// One containerized step of a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Container image reference.
    #[serde(default)]
    pub image_uri: String,
    /// Overrides the image entrypoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Arguments passed to the entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,
    /// Behavior flags, in insertion order without duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<ActionFlag>,
    /// Disks mounted into the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
    /// Container port name to host port.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub port_mappings: BTreeMap<String, u64>,
    /// Per-step timeout, e.g. `"90s"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// PID namespace to join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_namespace: Option<String>,
}

impl Action {
    /// Creates an action running the given image.
    #[must_use]
    pub fn new(image_uri: impl Into<String>) -> Self {
        Self {
            image_uri: image_uri.into(),
            ..Default::default()
        }
    }

    /// Creates an action that runs `commands` joined with `&&` under
    /// `bash -c`, mounting the working root disk.
    #[must_use]
    pub fn bash<I, S>(image_uri: impl Into<String>, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let script = commands
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" && ");
        Self::new(image_uri)
            .with_entrypoint("bash")
            .with_commands(["-c".to_string(), script])
            .with_mount(Mount::working_root())
    }

    /// Sets the entrypoint.
    #[must_use]
    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Sets the command arguments.
    #[must_use]
    pub fn with_commands(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a flag.
    #[must_use]
    pub fn with_flag(mut self, flag: ActionFlag) -> Self {
        self.add_flag(flag);
        self
    }

    /// Adds a mount.
    #[must_use]
    pub fn with_mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    /// Adds a port mapping.
    #[must_use]
    pub fn with_port(mut self, name: impl Into<String>, port: u64) -> Self {
        self.port_mappings.insert(name.into(), port);
        self
    }

    /// Adds a flag unless it is already present.
    pub fn add_flag(&mut self, flag: ActionFlag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Whether the action carries `flag`.
    #[must_use]
    pub fn has_flag(&self, flag: ActionFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// The first command argument, if any.
    #[must_use]
    pub fn first_command(&self) -> Option<&str> {
        self.commands.first().map(String::as_str)
    }
}
