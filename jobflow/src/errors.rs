//! Error types for the jobflow compiler and execution controller.
//!
//! Every failure a run can hit is one of the kinds below. All of them are
//! fatal to the run except [`ExecutionError`] values flagged as retriable,
//! which the controller may absorb by spending another attempt.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for jobflow operations.
#[derive(Debug, Error)]
pub enum JobflowError {
    /// A script line, option, port mapping or duration was malformed.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// The run configuration is inconsistent or incomplete.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The remote service rejected the request.
    #[error("{0}")]
    Submission(#[from] SubmissionError),

    /// The remote operation finished with an error.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport failure talking to a remote API.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote API answered with an error status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// The remote message.
        message: String,
        /// The raw response body.
        body: String,
    },
}

impl JobflowError {
    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = match self {
            Self::Parse(err) => err.to_dict(),
            Self::Config(err) => err.to_dict(),
            Self::Submission(err) => err.to_dict(),
            Self::Execution(err) => err.to_dict(),
            Self::Serialization(_) => {
                HashMap::from([("type".to_string(), serde_json::json!("SerializationError"))])
            }
            Self::Io(_) => HashMap::from([("type".to_string(), serde_json::json!("IoError"))]),
            Self::Http(_) => HashMap::from([("type".to_string(), serde_json::json!("HttpError"))]),
            Self::Api { status, body, .. } => HashMap::from([
                ("type".to_string(), serde_json::json!("ApiError")),
                ("status".to_string(), serde_json::json!(status)),
                ("body".to_string(), serde_json::json!(body)),
            ]),
        };
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Error raised when a script line or one of its options cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .line.map(|n| format!("line {n}: ")).unwrap_or_default())]
pub struct ParseError {
    /// The 1-based source line, when parsing a script file.
    pub line: Option<usize>,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    /// Creates a new parse error without line information.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: None,
            message: message.into(),
        }
    }

    /// Attaches the source line number.
    #[must_use]
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("ParseError"));
        map.insert("reason".to_string(), serde_json::json!(self.message));
        if let Some(line) = self.line {
            map.insert("line".to_string(), serde_json::json!(line));
        }
        map
    }
}

/// Errors caused by the run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Zones and regions are mutually exclusive.
    #[error("both zones and regions have been supplied")]
    ConflictingLocations,

    /// Neither a command nor a script was given.
    #[error("no command or input file was specified")]
    NoCommand,

    /// Both a command and a script were given.
    #[error("only one of a command or an input file may be specified")]
    MultipleSources,

    /// An input or output specifier could not be processed.
    #[error("processing {specifier:?}: {message}")]
    Specifier {
        /// The offending specifier.
        specifier: String,
        /// The reason for failure.
        message: String,
    },

    /// A remote zone/region listing failed.
    #[error("expanding {what}: {message}")]
    Lookup {
        /// What was being expanded ("zones" or "regions").
        what: String,
        /// The reason for failure.
        message: String,
    },

    /// Any other invalid setting.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates a specifier error.
    #[must_use]
    pub fn specifier(specifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Specifier {
            specifier: specifier.into(),
            message: message.into(),
        }
    }

    /// Creates a lookup error.
    #[must_use]
    pub fn lookup(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lookup {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("ConfigError"));
        match self {
            Self::Specifier { specifier, message } => {
                map.insert("specifier".to_string(), serde_json::json!(specifier));
                map.insert("reason".to_string(), serde_json::json!(message));
            }
            Self::Lookup { what, message } => {
                map.insert("what".to_string(), serde_json::json!(what));
                map.insert("reason".to_string(), serde_json::json!(message));
            }
            Self::Invalid(reason) => {
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::ConflictingLocations | Self::NoCommand | Self::MultipleSources => {}
        }
        map
    }
}

/// Error raised when the remote service refuses to start a pipeline.
///
/// Submission errors are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("starting pipeline: {message:?}{}", .body.as_ref().map(|b| format!(": {b:?}")).unwrap_or_default())]
pub struct SubmissionError {
    /// The remote message.
    pub message: String,
    /// The raw response body, when one was returned.
    pub body: Option<String>,
}

impl SubmissionError {
    /// Creates a new submission error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            body: None,
        }
    }

    /// Sets the response body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!("SubmissionError"));
        map.insert("reason".to_string(), serde_json::json!(self.message));
        if let Some(ref body) = self.body {
            map.insert("body".to_string(), serde_json::json!(body));
        }
        map
    }
}

/// The terminal outcome of a remote operation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operation {operation:?} failed: {message}")]
pub struct ExecutionError {
    /// The remote operation name.
    pub operation: String,
    /// The remote message.
    pub message: String,
    /// Whether another attempt may succeed.
    pub retriable: bool,
}

impl ExecutionError {
    /// Creates an error that consumes one attempt from the budget.
    #[must_use]
    pub fn retriable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retriable: true,
        }
    }

    /// Creates a non-recoverable error.
    #[must_use]
    pub fn fatal(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retriable: false,
        }
    }

    /// Turns a retriable error into the terminal error reported once the
    /// attempt budget is spent.
    #[must_use]
    pub fn exhausted(self, attempts: u32) -> Self {
        Self {
            message: format!("{} (attempt budget of {attempts} exhausted)", self.message),
            retriable: false,
            ..self
        }
    }

    /// Whether this outcome may be retried.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.retriable
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = if self.retriable {
            "RetriableExecutionError"
        } else {
            "FatalExecutionError"
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("operation".to_string(), serde_json::json!(self.operation));
        map.insert("reason".to_string(), serde_json::json!(self.message));
        map
    }
}

/// Result type for jobflow operations.
pub type Result<T> = std::result::Result<T, JobflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_with_line() {
        let err = ParseError::new("invalid port mapping \"x\"").at_line(3);
        assert_eq!(err.to_string(), "line 3: invalid port mapping \"x\"");
        assert_eq!(err.to_dict().get("line").unwrap(), 3);
    }

    #[test]
    fn test_parse_error_without_line() {
        let err = ParseError::new("bad duration");
        assert_eq!(err.to_string(), "bad duration");
        assert!(err.to_dict().get("line").is_none());
    }

    #[test]
    fn test_config_error_specifier() {
        let err = ConfigError::specifier("/missing", "reading input file: not found");
        assert!(err.to_string().contains("\"/missing\""));
        assert_eq!(err.to_dict().get("specifier").unwrap(), "/missing");
    }

    #[test]
    fn test_submission_error_carries_body() {
        let err = SubmissionError::new("quota exceeded").with_body("{\"code\":429}");
        assert!(err.to_string().contains("quota exceeded"));
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn test_execution_error_exhausted_is_fatal() {
        let err = ExecutionError::retriable("operations/1", "preempted");
        assert!(err.is_retriable());

        let err = err.exhausted(2);
        assert!(!err.is_retriable());
        assert!(err.message.contains("exhausted"));
        assert_eq!(err.to_dict().get("type").unwrap(), "FatalExecutionError");
    }

    #[test]
    fn test_jobflow_error_to_dict() {
        let err: JobflowError = ConfigError::ConflictingLocations.into();
        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "ConfigError");
        assert_eq!(
            dict.get("message").unwrap(),
            "both zones and regions have been supplied"
        );
    }
}
