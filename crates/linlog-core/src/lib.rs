//! # linlog-core
//!
//! Core types for checking recorded key-value histories for linearizability.
//!
//! This crate provides:
//! - `parser`: turns client log lines into [`LogRecord`]s
//! - `history`: pairs records into a well-nested [`History`] of call/return events
//! - `model`: the [`Model`] trait for sequential specifications and the
//!   key-value register [`KvModel`]
//! - `annotation` and `timeline`: diagnostic helpers
//!
//! ## Example
//!
//! ```
//! use linlog_core::{build_history, parse_lines, KvModel, Model};
//!
//! let records = parse_lines([
//!     "INFO worker_0 Setting x = 5",
//!     "INFO worker_0 Set x = 5",
//!     "INFO worker_0 Getting x",
//!     "INFO worker_0 Get x = 5",
//! ])
//! .unwrap();
//! let history = build_history(&records).unwrap();
//! assert_eq!(history.len(), 4);
//! assert_eq!(KvModel.partition(&history).len(), 1);
//! ```

pub mod annotation;
pub mod event;
pub mod history;
pub mod model;
pub mod parser;
pub mod timeline;

pub use annotation::Annotation;
pub use event::{Event, EventKind, OpKind, OperationId, Payload, WorkerId};
pub use history::{build_history, History, HistoryBuilder, HistoryError};
pub use model::{KvModel, KvState, Model, DEFAULT_VALUE};
pub use parser::{parse_file, parse_line, parse_lines, parse_reader, LogRecord, ParseError};
pub use timeline::render_timeline;
