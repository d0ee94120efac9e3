//! Duration strings in the `1h30m` / `90s` / `250ms` notation.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::ParseError;

fn whole_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
            .unwrap_or_else(|e| unreachable!("invalid duration pattern: {e}"))
    })
}

fn component_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)")
            .unwrap_or_else(|e| unreachable!("invalid duration pattern: {e}"))
    })
}

/// Parses a non-negative duration such as `"90s"`, `"1h30m"` or `"1.5h"`.
///
/// A bare `"0"` is accepted; every other value needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, ParseError> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if !whole_pattern().is_match(input) {
        return Err(ParseError::new(format!("invalid duration {input:?}")));
    }

    let mut seconds = 0f64;
    for caps in component_pattern().captures_iter(input) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| ParseError::new(format!("invalid duration {input:?}")))?;
        let scale = match &caps[2] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            _ => 3600.0,
        };
        seconds += value * scale;
    }

    Duration::try_from_secs_f64(seconds)
        .map_err(|_| ParseError::new(format!("duration {input:?} is out of range")))
}

/// Formats a duration as whole seconds, e.g. `"90s"`.
#[must_use]
pub fn format_seconds(duration: Duration) -> String {
    format!("{:.0}s", duration.as_secs_f64())
}
