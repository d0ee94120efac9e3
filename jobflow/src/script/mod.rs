//! Job description parsing.
//!
//! This module provides:
//! - Line-oriented script parsing (`ScriptParser::parse_line`)
//! - Whole-document detection of raw requests, action arrays and scripts
//! - Duration strings used by action and pipeline timeouts

mod duration;
mod file;
mod line;

pub use duration::{format_seconds, parse_duration};
pub use file::{ParsedScript, ScriptSource};
pub use line::{is_cloud_command, parse_ports, ScriptParser};
