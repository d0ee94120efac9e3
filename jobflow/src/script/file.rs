//! Whole-file parsing: raw requests, action arrays and scripts.

use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

use super::line::ScriptParser;
use crate::core::{Action, Request};
use crate::errors::{ConfigError, JobflowError, ParseError};

/// Where the job description comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    /// A single command line.
    Command(String),
    /// A file on disk.
    File(PathBuf),
    /// Standard input.
    Stdin,
    /// Text already in memory.
    Text(String),
}

impl ScriptSource {
    /// Resolves the source named by a command and/or script path.
    ///
    /// A script path of `-` means standard input.
    pub fn resolve(command: Option<&str>, script: Option<&str>) -> Result<Self, ConfigError> {
        match (command.filter(|c| !c.is_empty()), script.filter(|s| !s.is_empty())) {
            (Some(_), Some(_)) => Err(ConfigError::MultipleSources),
            (Some(command), None) => Ok(Self::Command(command.to_string())),
            (None, Some("-")) => Ok(Self::Stdin),
            (None, Some(path)) => Ok(Self::File(PathBuf::from(path))),
            (None, None) => Err(ConfigError::NoCommand),
        }
    }
}

/// The result of parsing a job description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedScript {
    /// A complete request, used as-is.
    Request(Box<Request>),
    /// User actions to be wrapped with staging steps.
    Actions(Vec<Action>),
}

impl ScriptParser {
    /// Reads and parses a job description.
    ///
    /// Files and standard input are tried, in order, as a raw request, as a
    /// JSON array of actions, and finally as script text. A single command is
    /// always parsed as one script line.
    pub fn parse_source(&self, source: &ScriptSource) -> Result<ParsedScript, JobflowError> {
        let text = match source {
            ScriptSource::Command(command) => {
                let actions = self
                    .parse_line(command)
                    .map_err(|e| ParseError::new(format!("creating action from command: {e}")))?
                    .into_iter()
                    .collect();
                return Ok(ParsedScript::Actions(actions));
            }
            ScriptSource::File(path) => std::fs::read_to_string(path)?,
            ScriptSource::Stdin => {
                let mut text = String::new();
                std::io::stdin().read_to_string(&mut text)?;
                text
            }
            ScriptSource::Text(text) => text.clone(),
        };
        self.parse_document(&text).map_err(JobflowError::from)
    }

    /// Parses an in-memory job description using the same detection order
    /// as [`ScriptParser::parse_source`].
    ///
    /// Only a JSON object is read as a request and only a JSON array as
    /// actions.
    pub fn parse_document(&self, text: &str) -> Result<ParsedScript, ParseError> {
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => {
                if let Ok(request) = serde_json::from_value::<Request>(value) {
                    return Ok(ParsedScript::Request(Box::new(request)));
                }
            }
            Ok(value @ Value::Array(_)) => {
                if let Ok(actions) = serde_json::from_value::<Vec<Action>>(value) {
                    return Ok(ParsedScript::Actions(actions));
                }
            }
            _ => {}
        }
        self.parse_script(text).map(ParsedScript::Actions)
    }

    /// Parses script text, joining lines that end in `\`.
    ///
    /// Errors carry the 1-based number of the line that completed the
    /// failing logical line.
    pub fn parse_script(&self, text: &str) -> Result<Vec<Action>, ParseError> {
        let mut actions = Vec::new();
        let mut buffer = String::new();
        let mut line_number = 0;

        for line in text.lines() {
            line_number += 1;
            if let Some(continued) = line.strip_suffix('\\') {
                buffer.push_str(continued);
                continue;
            }
            buffer.push_str(line);
            if let Some(action) = self
                .parse_line(&buffer)
                .map_err(|e| e.at_line(line_number))?
            {
                actions.push(action);
            }
            buffer.clear();
        }

        if !buffer.is_empty() {
            if let Some(action) = self
                .parse_line(&buffer)
                .map_err(|e| e.at_line(line_number))?
            {
                actions.push(action);
            }
        }

        Ok(actions)
    }
}
