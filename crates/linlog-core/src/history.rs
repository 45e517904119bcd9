//! Histories of call/return events.
//!
//! A [`History`] is the arrival-ordered sequence of events from a log. Each
//! worker's calls and returns are well nested: a worker has at most one open
//! call, and every return closes the call that precedes it. Different
//! workers' operations may overlap arbitrarily.
//!
//! [`HistoryBuilder`] pairs parsed [`LogRecord`]s into such a history.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::{debug, warn};

use crate::event::{Event, EventKind, OpKind, OperationId, Payload, WorkerId};
use crate::parser::LogRecord;

/// An ordered sequence of call and return events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History<V> {
    events: Vec<Event<V>>,
}

impl<V> Default for History<V> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<V> History<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap events that are already well nested per worker.
    #[must_use]
    pub fn from_events(events: Vec<Event<V>>) -> Self {
        Self { events }
    }

    #[must_use]
    pub fn events(&self) -> &[Event<V>] {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of distinct operations (calls).
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_call()).count()
    }

    /// Calls that never saw a return, in call order.
    #[must_use]
    pub fn pending(&self) -> Vec<&Event<V>> {
        let mut open: BTreeMap<OperationId, &Event<V>> = BTreeMap::new();
        for event in &self.events {
            match event.kind {
                EventKind::Call => {
                    open.insert(event.id, event);
                }
                EventKind::Return => {
                    open.remove(&event.id);
                }
            }
        }
        open.into_values().collect()
    }

    /// Workers appearing in the history, ascending.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = self.events.iter().map(|e| e.worker).collect();
        workers.sort_unstable();
        workers.dedup();
        workers
    }

    /// Find the call event of an operation.
    #[must_use]
    pub fn call_of(&self, id: OperationId) -> Option<&Event<V>> {
        self.events.iter().find(|e| e.id == id && e.is_call())
    }

    /// Find the return event of an operation.
    #[must_use]
    pub fn return_of(&self, id: OperationId) -> Option<&Event<V>> {
        self.events.iter().find(|e| e.id == id && !e.is_call())
    }
}

impl<V: Clone> History<V> {
    /// Split into sub-histories, one per distinct partition key.
    ///
    /// An operation is placed by the key of its call event; its return
    /// follows it. Partitions are ordered by key and each keeps the
    /// original relative order of its events.
    pub fn partition_by<K, F>(&self, key_of: F) -> Vec<History<V>>
    where
        K: Ord + Clone,
        F: Fn(&V) -> K,
    {
        let mut op_key: HashMap<OperationId, K> = HashMap::new();
        let mut parts: BTreeMap<K, Vec<Event<V>>> = BTreeMap::new();

        for event in &self.events {
            let key = match event.kind {
                EventKind::Call => {
                    let key = key_of(&event.value);
                    op_key.insert(event.id, key.clone());
                    key
                }
                EventKind::Return => op_key
                    .remove(&event.id)
                    .unwrap_or_else(|| key_of(&event.value)),
            };
            parts.entry(key).or_default().push(event.clone());
        }

        parts.into_values().map(History::from_events).collect()
    }
}

/// History construction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("line {line}: {worker} completed an operation it never issued")]
    UnmatchedReturn { line: usize, worker: WorkerId },

    #[error("line {line}: {worker} issued a new operation while {open} is still open")]
    CallWhileOpen {
        line: usize,
        worker: WorkerId,
        open: OperationId,
    },

    #[error("line {line}: {worker} completed a {got:?} but {open} is a {expected:?}")]
    MismatchedReturn {
        line: usize,
        worker: WorkerId,
        open: OperationId,
        expected: OpKind,
        got: OpKind,
    },
}

/// Pairs log records into a well-formed history.
///
/// Holds the per-worker table of open operations for one build; nothing
/// outlives [`HistoryBuilder::finish`].
#[derive(Debug, Default)]
pub struct HistoryBuilder {
    events: Vec<Event<Payload>>,
    open: HashMap<WorkerId, (OperationId, OpKind)>,
    next_id: usize,
}

impl HistoryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one record in log order.
    pub fn push(&mut self, record: &LogRecord) -> Result<(), HistoryError> {
        let payload = Payload {
            op: record.op,
            key: record.key.clone(),
            value: record.value.clone(),
        };

        match record.phase {
            EventKind::Call => {
                if let Some(&(open, _)) = self.open.get(&record.worker) {
                    return Err(HistoryError::CallWhileOpen {
                        line: record.line,
                        worker: record.worker,
                        open,
                    });
                }
                let id = OperationId(self.next_id);
                self.next_id += 1;
                self.open.insert(record.worker, (id, record.op));
                self.events.push(Event::call(record.worker, id, payload));
            }
            EventKind::Return => {
                let Some((id, expected)) = self.open.remove(&record.worker) else {
                    return Err(HistoryError::UnmatchedReturn {
                        line: record.line,
                        worker: record.worker,
                    });
                };
                if expected != record.op {
                    return Err(HistoryError::MismatchedReturn {
                        line: record.line,
                        worker: record.worker,
                        open: id,
                        expected,
                        got: record.op,
                    });
                }
                self.events.push(Event::ret(record.worker, id, payload));
            }
        }
        Ok(())
    }

    /// Finish the build. Operations still open become pending calls.
    #[must_use]
    pub fn finish(self) -> History<Payload> {
        if !self.open.is_empty() {
            let mut workers: Vec<WorkerId> = self.open.keys().copied().collect();
            workers.sort_unstable();
            warn!(
                pending = workers.len(),
                ?workers,
                "log ends with operations that never completed"
            );
        }
        debug!(
            events = self.events.len(),
            operations = self.next_id,
            "built history"
        );
        History::from_events(self.events)
    }
}

/// Build a history from parsed records in one pass.
pub fn build_history<'a, I>(records: I) -> Result<History<Payload>, HistoryError>
where
    I: IntoIterator<Item = &'a LogRecord>,
{
    let mut builder = HistoryBuilder::new();
    for record in records {
        builder.push(record)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_lines;

    fn records(lines: &[&str]) -> Vec<LogRecord> {
        parse_lines(lines).unwrap()
    }

    #[test]
    fn test_pairs_calls_with_returns() {
        let recs = records(&[
            "INFO worker_1 Setting x = 1",
            "INFO worker_2 Getting x",
            "INFO worker_1 Set x = 1",
            "INFO worker_2 Get x = 1",
        ]);
        let history = build_history(&recs).unwrap();

        assert_eq!(history.len(), 4);
        assert_eq!(history.operation_count(), 2);
        let ids: Vec<(WorkerId, EventKind, OperationId)> = history
            .events()
            .iter()
            .map(|e| (e.worker, e.kind, e.id))
            .collect();
        assert_eq!(
            ids,
            vec![
                (WorkerId(1), EventKind::Call, OperationId(0)),
                (WorkerId(2), EventKind::Call, OperationId(1)),
                (WorkerId(1), EventKind::Return, OperationId(0)),
                (WorkerId(2), EventKind::Return, OperationId(1)),
            ]
        );
        assert!(history.pending().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_by_same_worker() {
        let recs = records(&[
            "INFO worker_0 Setting x = 1",
            "INFO worker_0 Set x = 1",
            "INFO worker_0 Getting x",
            "INFO worker_0 Get x = 1",
        ]);
        let history = build_history(&recs).unwrap();
        let ids: Vec<OperationId> = history.events().iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec![OperationId(0), OperationId(0), OperationId(1), OperationId(1)]
        );
    }

    #[test]
    fn test_unmatched_return_fails() {
        let recs = records(&["INFO worker_4 Get x = 0"]);
        let err = build_history(&recs).unwrap_err();
        assert_eq!(
            err,
            HistoryError::UnmatchedReturn {
                line: 1,
                worker: WorkerId(4)
            }
        );
    }

    #[test]
    fn test_second_call_while_open_fails() {
        let recs = records(&["INFO worker_4 Getting x", "INFO worker_4 Setting x = 3"]);
        let err = build_history(&recs).unwrap_err();
        assert!(matches!(err, HistoryError::CallWhileOpen { line: 2, .. }));
    }

    #[test]
    fn test_mismatched_return_fails() {
        let recs = records(&["INFO worker_4 Getting x", "INFO worker_4 Set x = 3"]);
        let err = build_history(&recs).unwrap_err();
        assert!(matches!(
            err,
            HistoryError::MismatchedReturn {
                expected: OpKind::Read,
                got: OpKind::Write,
                ..
            }
        ));
    }

    #[test]
    fn test_open_call_is_pending() {
        let recs = records(&[
            "INFO worker_0 Setting x = 1",
            "INFO worker_1 Getting x",
            "INFO worker_1 Get x = 0",
        ]);
        let history = build_history(&recs).unwrap();
        let pending = history.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].worker, WorkerId(0));
        assert!(history.return_of(OperationId(0)).is_none());
        assert!(history.call_of(OperationId(0)).is_some());
    }

    #[test]
    fn test_empty_log_gives_empty_history() {
        let history = build_history(&records(&["nothing here"])).unwrap();
        assert!(history.is_empty());
        assert!(history.workers().is_empty());
    }

    #[test]
    fn test_partition_by_key_keeps_operations_together() {
        let recs = records(&[
            "INFO worker_0 Setting x = 1",
            "INFO worker_1 Setting y = 2",
            "INFO worker_0 Set x = 1",
            "INFO worker_1 Set y = 2",
            "INFO worker_0 Getting y",
            "INFO worker_0 Get y = 2",
        ]);
        let history = build_history(&recs).unwrap();
        let parts = history.partition_by(|p| p.key.clone());

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 2);
        assert!(parts[0].events().iter().all(|e| e.value.key == "x"));
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[1].workers(), vec![WorkerId(0), WorkerId(1)]);
    }
}
