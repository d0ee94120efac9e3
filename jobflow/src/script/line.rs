//! Parsing of single script lines into actions.
//!
//! A line has the shape `<command tokens> [&] [# option ...]`. Options after
//! the `#` are either bare flags (`always_run`) or `key=value` pairs
//! (`image=`, `timeout=`, `ports=`); unknown keys are accepted and ignored.

use std::collections::BTreeMap;
use tracing::debug;

use super::duration::{format_seconds, parse_duration};
use crate::config::RunConfig;
use crate::core::{Action, ActionFlag, Mount};
use crate::errors::ParseError;

/// Command names that need the cloud SDK image.
const CLOUD_COMMANDS: [&str; 2] = ["gsutil", "gcloud"];

/// Whether `command` is a cloud CLI that requires the cloud SDK image.
#[must_use]
pub fn is_cloud_command(command: &str) -> bool {
    CLOUD_COMMANDS.contains(&command)
}

/// Turns script lines into actions.
#[derive(Debug, Clone)]
pub struct ScriptParser {
    default_image: String,
    cloud_sdk_image: String,
}

impl ScriptParser {
    /// Creates a parser with explicit image choices.
    #[must_use]
    pub fn new(default_image: impl Into<String>, cloud_sdk_image: impl Into<String>) -> Self {
        Self {
            default_image: default_image.into(),
            cloud_sdk_image: cloud_sdk_image.into(),
        }
    }

    /// Creates a parser using the images from a run configuration.
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(&config.image, &config.cloud_sdk_image)
    }

    /// Parses one logical line.
    ///
    /// Returns `Ok(None)` for lines with neither command tokens nor flags.
    pub fn parse_line(&self, line: &str) -> Result<Option<Action>, ParseError> {
        let mut flags = Vec::new();
        let mut options = BTreeMap::new();

        let command_text = match line.find('#') {
            Some(n) => {
                for option in line[n + 1..].split_whitespace() {
                    match option.split_once('=') {
                        Some((key, value)) => {
                            options.insert(key.to_string(), value.to_string());
                        }
                        None => flags.push(option.parse::<ActionFlag>()?),
                    }
                }
                &line[..n]
            }
            None => line,
        };

        let mut tokens: Vec<&str> = command_text.split_whitespace().collect();
        if tokens.last() == Some(&"&") {
            tokens.pop();
            flags.push(ActionFlag::RunInBackground);
        }

        if tokens.is_empty() && flags.is_empty() {
            return Ok(None);
        }

        let mut action = Action::new(self.detect_image(&tokens, &options));
        for flag in flags {
            action.add_flag(flag);
        }
        if !tokens.is_empty() {
            action = action
                .with_entrypoint("bash")
                .with_commands(["-c".to_string(), tokens.join(" ")]);
        }

        if let Some(timeout) = options.get("timeout") {
            let duration = parse_duration(timeout)
                .map_err(|e| ParseError::new(format!("parsing action timeout: {}", e.message)))?;
            action.timeout = Some(format_seconds(duration));
        }

        action.mounts.push(Mount::working_root());

        if let Some(ports) = options.get("ports") {
            action.port_mappings = parse_ports(ports)?;
        }

        for key in options.keys() {
            if !matches!(key.as_str(), "image" | "timeout" | "ports") {
                debug!(option = %key, "Ignoring unrecognised action option");
            }
        }

        Ok(Some(action))
    }

    fn detect_image(&self, tokens: &[&str], options: &BTreeMap<String, String>) -> String {
        if let Some(image) = options.get("image") {
            return image.clone();
        }
        if tokens.first().is_some_and(|t| is_cloud_command(t)) {
            return self.cloud_sdk_image.clone();
        }
        self.default_image.clone()
    }
}

/// Parses a `name:port[;name:port...]` mapping.
pub fn parse_ports(input: &str) -> Result<BTreeMap<String, u64>, ParseError> {
    let mut ports = BTreeMap::new();
    for pair in input.split(';') {
        let (name, port) = match pair.find(':') {
            Some(i) if i >= 1 => (&pair[..i], &pair[i + 1..]),
            _ => return Err(ParseError::new(format!("invalid port mapping {pair:?}"))),
        };
        let port: u64 = port
            .parse()
            .map_err(|e| ParseError::new(format!("parsing host port in {pair:?}: {e}")))?;
        ports.insert(name.to_string(), port);
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parser() -> ScriptParser {
        ScriptParser::new("bash", "cloud-sdk")
    }

    #[test]
    fn test_parse_background_with_options() {
        let action = parser()
            .parse_line("echo hi &  # ports=a:1;b:2 image=foo")
            .unwrap()
            .unwrap();

        assert_eq!(action.image_uri, "foo");
        assert_eq!(action.flags, vec![ActionFlag::RunInBackground]);
        assert_eq!(action.entrypoint.as_deref(), Some("bash"));
        assert_eq!(action.commands, vec!["-c", "echo hi"]);
        assert_eq!(
            action.port_mappings,
            BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
        );
        assert_eq!(action.mounts, vec![Mount::working_root()]);
    }

    #[test]
    fn test_parse_blank_lines() {
        assert_eq!(parser().parse_line("").unwrap(), None);
        assert_eq!(parser().parse_line("   \t ").unwrap(), None);
        assert_eq!(parser().parse_line("  # image=foo").unwrap(), None);
    }

    #[test]
    fn test_parse_flags_only() {
        let action = parser().parse_line("# always_run").unwrap().unwrap();
        assert_eq!(action.flags, vec![ActionFlag::AlwaysRun]);
        assert!(action.commands.is_empty());
        assert_eq!(action.entrypoint, None);
    }

    #[test]
    fn test_image_explicit_option_wins() {
        let action = parser().parse_line("gsutil ls # image=custom").unwrap().unwrap();
        assert_eq!(action.image_uri, "custom");
    }

    #[test]
    fn test_image_cloud_command_heuristic() {
        let action = parser().parse_line("gcloud info").unwrap().unwrap();
        assert_eq!(action.image_uri, "cloud-sdk");

        let action = parser().parse_line("gsutil cp a b").unwrap().unwrap();
        assert_eq!(action.image_uri, "cloud-sdk");
    }

    #[test]
    fn test_image_default() {
        let action = parser().parse_line("echo gsutil").unwrap().unwrap();
        assert_eq!(action.image_uri, "bash");

        let action = parser().parse_line("gsutilx ls").unwrap().unwrap();
        assert_eq!(action.image_uri, "bash");
    }

    #[test]
    fn test_parse_timeout() {
        let action = parser().parse_line("sleep 100 # timeout=1m30s").unwrap().unwrap();
        assert_eq!(action.timeout.as_deref(), Some("90s"));
    }

    #[test]
    fn test_parse_bad_timeout() {
        let err = parser().parse_line("sleep 1 # timeout=soon").unwrap_err();
        assert!(err.message.contains("parsing action timeout"));
    }

    #[test]
    fn test_background_and_flag_not_duplicated() {
        let action = parser()
            .parse_line("server & # run_in_background")
            .unwrap()
            .unwrap();
        assert_eq!(action.flags, vec![ActionFlag::RunInBackground]);
    }

    #[test]
    fn test_unknown_flag_is_error() {
        assert!(parser().parse_line("echo # frobnicate").is_err());
    }

    #[test]
    fn test_unknown_option_is_ignored() {
        let action = parser().parse_line("echo # owner=me").unwrap().unwrap();
        assert_eq!(action.commands, vec!["-c", "echo"]);
    }

    #[test]
    fn test_parse_ports_errors() {
        let err = parse_ports(":22").unwrap_err();
        assert!(err.message.contains("\":22\""));

        let err = parse_ports("ssh").unwrap_err();
        assert!(err.message.contains("invalid port mapping"));

        let err = parse_ports("ssh:-1").unwrap_err();
        assert!(err.message.contains("ssh:-1"));

        let err = parse_ports("a:1;b:x").unwrap_err();
        assert!(err.message.contains("b:x"));
    }

    #[test]
    fn test_bad_ports_fail_the_line() {
        assert!(parser().parse_line("nc -l # ports=1234").is_err());
    }

    #[test]
    fn test_is_cloud_command() {
        assert!(is_cloud_command("gsutil"));
        assert!(is_cloud_command("gcloud"));
        assert!(!is_cloud_command("bq"));
    }
}
