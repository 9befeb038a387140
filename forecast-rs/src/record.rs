//! Input record grammar.
//!
//! A record is `<timestamp>,<history>` where the timestamp is
//! `YYYY-MM-DD HH:MM:SS` and the history is a bracketed, comma-space
//! separated list of integers, oldest first. The history may be wrapped in
//! one layer of CSV double quotes.

use crate::{ForecastError, Result};
use chrono::NaiveDateTime;

/// Timestamp format of every record.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Longest record prefix quoted in parse errors.
const EXCERPT_CHARS: usize = 80;

/// One parsed input record.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Source timestamp text, echoed verbatim in the output
    pub raw_timestamp: String,

    /// Parsed timestamp
    pub timestamp: NaiveDateTime,

    /// Raw history values, oldest first
    pub history: Vec<i64>,
}

impl Observation {
    /// History widened to `f64` for smoothing.
    pub fn history_f64(&self) -> Vec<f64> {
        self.history.iter().map(|&v| v as f64).collect()
    }
}

/// Parse one input line.
///
/// # Arguments
/// * `line_no` - 1-based line number, reported in errors
/// * `raw` - Line content without the trailing newline
pub fn parse_record(line_no: usize, raw: &str) -> Result<Observation> {
    let parse_err = |message: String| ForecastError::Parse {
        line: line_no,
        record: excerpt(raw),
        message,
    };

    let (ts, history) = raw
        .split_once(',')
        .ok_or_else(|| parse_err("expected `<timestamp>,<history>`".to_string()))?;

    let timestamp = parse_timestamp(ts).map_err(&parse_err)?;
    let history = parse_history(history).map_err(&parse_err)?;

    Ok(Observation {
        raw_timestamp: ts.to_string(),
        timestamp,
        history,
    })
}

/// Leading part of a record, for diagnostics.
fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp.
pub fn parse_timestamp(s: &str) -> std::result::Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid timestamp {:?}: {}", s, e))
}

/// Parse a history literal such as `"[1, 2, 3]"`.
pub fn parse_history(s: &str) -> std::result::Result<Vec<i64>, String> {
    let trimmed = s.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(trimmed);

    let inner = unquoted
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or_else(|| "history must be wrapped in brackets".to_string())?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.parse::<i64>()
                .map_err(|e| format!("invalid history value {:?}: {}", item, e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_record_quoted() {
        let obs = parse_record(2, "2023-01-02 13:45:07,\"[1, 2, 3]\"").unwrap();
        assert_eq!(obs.raw_timestamp, "2023-01-02 13:45:07");
        assert_eq!(obs.timestamp.year(), 2023);
        assert_eq!(obs.timestamp.hour(), 13);
        assert_eq!(obs.timestamp.minute(), 45);
        assert_eq!(obs.timestamp.second(), 7);
        assert_eq!(obs.history, vec![1, 2, 3]);
    }

    #[test]
    fn test_parse_record_bare_brackets() {
        let obs = parse_record(2, "2023-01-02 00:00:00,[10, -4, 0]").unwrap();
        assert_eq!(obs.history, vec![10, -4, 0]);
        assert_eq!(obs.history_f64(), vec![10.0, -4.0, 0.0]);
    }

    #[test]
    fn test_parse_history_empty_list() {
        assert_eq!(parse_history("[]").unwrap(), Vec::<i64>::new());
    }

    #[test]
    fn test_parse_record_missing_comma() {
        let err = parse_record(5, "2023-01-02 00:00:00").unwrap_err();
        match err {
            ForecastError::Parse { line, record, .. } => {
                assert_eq!(line, 5);
                assert_eq!(record, "2023-01-02 00:00:00");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_quotes_excerpt() {
        let long = format!("2023-01-02 00:00:00,[{}, x]", vec!["1"; 500].join(", "));
        match parse_record(2, &long).unwrap_err() {
            ForecastError::Parse { record, .. } => {
                assert!(record.starts_with("2023-01-02 00:00:00,[1, 1"));
                assert!(record.ends_with("..."));
                assert_eq!(record.len(), EXCERPT_CHARS + 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_record_bad_timestamp() {
        for raw in [
            "2023-13-02 00:00:00,[1]",
            "2023-01-02T00:00:00,[1]",
            "2023-01-02,[1]",
            "yesterday,[1]",
        ] {
            let err = parse_record(3, raw).unwrap_err();
            assert!(matches!(err, ForecastError::Parse { line: 3, .. }), "{}", raw);
        }
    }

    #[test]
    fn test_parse_record_bad_history() {
        for raw in [
            "2023-01-02 00:00:00,1, 2, 3",
            "2023-01-02 00:00:00,[1, x, 3]",
            "2023-01-02 00:00:00,[1.5, 2]",
            "2023-01-02 00:00:00,[1, 2",
        ] {
            let err = parse_record(4, raw).unwrap_err();
            assert!(matches!(err, ForecastError::Parse { line: 4, .. }), "{}", raw);
        }
    }
}
