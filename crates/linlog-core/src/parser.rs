//! Client log parser.
//!
//! Extracts register operations from free-text client logs. Four line
//! shapes are recognised, all emitted at `INFO` level by a worker token
//! `worker_<n>`:
//!
//! | Shape | Text | Record |
//! |-------|------|--------|
//! | write call | `Setting KEY = VALUE` | write, call |
//! | write return | `Set KEY = VALUE` | write, return |
//! | read call | `Getting KEY` | read, call |
//! | read return | `Get KEY = VALUE` | read, return |
//!
//! Any other line is not an operation and is skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::debug;

use crate::event::{EventKind, OpKind, WorkerId};

/// Level and worker prefix shared by every recognised line.
const PREFIX: &str = r"INFO[\s|]+worker_(?P<worker>\d+)[\s|]+";

/// One recognised log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// 1-based line number in the source.
    pub line: usize,
    pub worker: WorkerId,
    pub op: OpKind,
    pub key: String,
    /// Empty for a read call.
    pub value: String,
    /// `Call` for an issued operation, `Return` for a completed one.
    pub phase: EventKind,
}

impl LogRecord {
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.phase == EventKind::Call
    }
}

/// Log parsing errors. All of them abort the run.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: invalid worker id {raw:?}: {source}")]
    InvalidWorkerId {
        line: usize,
        raw: String,
        #[source]
        source: ParseIntError,
    },
}

struct LinePattern {
    regex: Regex,
    op: OpKind,
    phase: EventKind,
}

impl LinePattern {
    fn new(body: &str, op: OpKind, phase: EventKind) -> Self {
        let regex = Regex::new(&format!("{PREFIX}{body}"))
            .unwrap_or_else(|e| panic!("invalid built-in log pattern {body:?}: {e}"));
        Self { regex, op, phase }
    }
}

static PATTERNS: LazyLock<[LinePattern; 4]> = LazyLock::new(|| {
    [
        LinePattern::new(
            r"Setting\s+(?P<key>\w+)\s*=\s*(?P<value>\w+)",
            OpKind::Write,
            EventKind::Call,
        ),
        LinePattern::new(
            r"Set\s+(?P<key>\w+)\s*=\s*(?P<value>\w+)",
            OpKind::Write,
            EventKind::Return,
        ),
        LinePattern::new(r"Getting\s+(?P<key>\w+)", OpKind::Read, EventKind::Call),
        LinePattern::new(
            r"Get\s+(?P<key>\w+)\s*=\s*(?P<value>\w+)",
            OpKind::Read,
            EventKind::Return,
        ),
    ]
});

/// Parse a single line.
///
/// Returns `Ok(None)` for lines that are not register operations.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<LogRecord>, ParseError> {
    for pattern in PATTERNS.iter() {
        let Some(caps) = pattern.regex.captures(line) else {
            continue;
        };
        let raw = &caps["worker"];
        let worker = raw.parse::<u64>().map_err(|source| ParseError::InvalidWorkerId {
            line: line_no,
            raw: raw.to_string(),
            source,
        })?;

        return Ok(Some(LogRecord {
            line: line_no,
            worker: WorkerId(worker),
            op: pattern.op,
            key: capture(&caps, "key"),
            value: capture(&caps, "value"),
            phase: pattern.phase,
        }));
    }
    Ok(None)
}

fn capture(caps: &Captures<'_>, name: &str) -> String {
    caps.name(name).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Parse every line of an in-memory log, in order.
pub fn parse_lines<I, S>(lines: I) -> Result<Vec<LogRecord>, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for (i, line) in lines.into_iter().enumerate() {
        if let Some(record) = parse_line(i + 1, line.as_ref())? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Parse a log from any buffered reader.
pub fn parse_reader<R: BufRead>(reader: R, path: &Path) -> Result<Vec<LogRecord>, ParseError> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(record) = parse_line(i + 1, &line)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Parse a log file from disk.
pub fn parse_file(path: &Path) -> Result<Vec<LogRecord>, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_reader(BufReader::new(file), path)?;
    debug!(path = %path.display(), records = records.len(), "parsed log");
    Ok(records)
}
