//! Staging of inputs and outputs on the working disk.
//!
//! Inputs are copied (or FUSE-mounted) under `/mnt/google/.google/input`,
//! outputs are collected under `/mnt/google/.google/output` and copied back
//! after the user actions, and every directory the staging steps need is
//! created up front by a single `mkdir -p`.

mod directories;
mod planner;
mod storage;

pub use directories::{merge_directories, mkdir_command};
pub use planner::{LocalizationPlan, LocalizationPlanner};
pub use storage::{bucket_of, join_paths, Glob, Specifier, LOG_PATH, STAGING_ROOT};
