//! Core domain model types for jobflow.
//!
//! This module contains the request graph the compiler produces:
//! - Actions and their behavior flags
//! - Pipelines, resources and the VM description
//! - The request envelope submitted to the execution service

mod action;
mod flags;
mod request;

pub use action::{Action, Mount, SHARED_PID_NAMESPACE, WORKING_DISK, WORKING_MOUNT_PATH};
pub use flags::ActionFlag;
pub use request::{
    Accelerator, Disk, Network, Pipeline, Request, Resources, ServiceAccount, VirtualMachine,
};
