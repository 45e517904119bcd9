//! Checking engine boundary.
//!
//! An [`Engine`] decides whether a history can be explained by some
//! sequential execution of a [`Model`]. It is given a time budget and
//! answers with a three-valued [`CheckResult`] plus [`LinearizationInfo`]
//! diagnostics.
//!
//! [`check_partitions`] is the shared driver: partitions are checked one at
//! a time on a dedicated thread while the caller waits at most the time
//! budget. On expiry the stop flag handed to the checker is raised and the
//! caller returns immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use linlog_core::{Annotation, History, Model, OperationId};
use tracing::debug;

use crate::error::EngineError;

/// Engine answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// Some linearization exists.
    Ok,
    /// No linearization exists.
    Failed,
    /// Undecided within the time budget.
    Unknown,
}

/// Answer for a single partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// Witness ordering of the partition's operations.
    Linearizable(Vec<OperationId>),
    /// No ordering exists. Carries the longest legal prefixes found.
    Illegal(Vec<Vec<OperationId>>),
    /// Not decided: stopped, or beyond what the checker can handle.
    Undecided,
}

/// Diagnostics produced by a check.
///
/// Holds the partitions the engine checked, a witness linearization for
/// every partition proven linearizable, the partitions proven not to be
/// together with the longest legal prefixes found for them, and any
/// annotations the caller attached.
#[derive(Debug, Clone)]
pub struct LinearizationInfo<V> {
    partitions: Vec<History<V>>,
    linearizations: Vec<Option<Vec<OperationId>>>,
    prefixes: Vec<Vec<Vec<OperationId>>>,
    failed: Vec<usize>,
    annotations: Vec<Annotation>,
}

impl<V> LinearizationInfo<V> {
    /// Empty diagnostics for a set of partitions.
    #[must_use]
    pub fn new(partitions: Vec<History<V>>) -> Self {
        let linearizations = vec![None; partitions.len()];
        let prefixes = vec![Vec::new(); partitions.len()];
        Self {
            partitions,
            linearizations,
            prefixes,
            failed: Vec::new(),
            annotations: Vec::new(),
        }
    }

    #[must_use]
    pub fn partitions(&self) -> &[History<V>] {
        &self.partitions
    }

    /// Record a witness ordering for a partition.
    pub fn record_linearization(&mut self, partition: usize, order: Vec<OperationId>) {
        debug_assert!(partition < self.partitions.len(), "Partition index out of range");
        self.linearizations[partition] = Some(order);
    }

    /// Record that a partition has no linearization.
    pub fn record_failure(&mut self, partition: usize) {
        debug_assert!(partition < self.partitions.len(), "Partition index out of range");
        if !self.failed.contains(&partition) {
            self.failed.push(partition);
            self.failed.sort_unstable();
        }
    }

    /// Record a legal prefix found for a partition without a witness.
    pub fn record_prefix(&mut self, partition: usize, prefix: Vec<OperationId>) {
        debug_assert!(partition < self.partitions.len(), "Partition index out of range");
        if !prefix.is_empty() {
            self.prefixes[partition].push(prefix);
        }
    }

    /// Witness for one partition, if the engine found one.
    #[must_use]
    pub fn linearization(&self, partition: usize) -> Option<&[OperationId]> {
        self.linearizations.get(partition)?.as_deref()
    }

    /// Longest legal prefixes recorded for one partition.
    #[must_use]
    pub fn prefixes(&self, partition: usize) -> &[Vec<OperationId>] {
        self.prefixes.get(partition).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Partitions proven not linearizable, ascending.
    #[must_use]
    pub fn failed_partitions(&self) -> &[usize] {
        &self.failed
    }

    /// Orderings discovered, grouped by partition.
    ///
    /// Entry `i` holds the witness of partition `i` when one was found,
    /// otherwise the longest legal prefixes recorded for it. It is empty
    /// when the engine found nothing (unchecked, or no operation could go
    /// first).
    #[must_use]
    pub fn partial_linearizations(&self) -> Vec<Vec<Vec<OperationId>>> {
        self.linearizations
            .iter()
            .zip(&self.prefixes)
            .map(|(full, prefixes)| match full {
                Some(order) => vec![order.clone()],
                None => prefixes.clone(),
            })
            .collect()
    }

    pub fn add_annotations(&mut self, annotations: impl IntoIterator<Item = Annotation>) {
        self.annotations.extend(annotations);
    }

    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Describe an operation of a partition through the model.
    ///
    /// Operations without a return are described from their input alone.
    pub fn describe_operation<M>(&self, model: &M, partition: usize, id: OperationId) -> String
    where
        M: Model<Value = V>,
    {
        let Some(history) = self.partitions.get(partition) else {
            return id.to_string();
        };
        match (history.call_of(id), history.return_of(id)) {
            (Some(call), Some(ret)) => model.describe_operation(&call.value, &ret.value),
            (Some(call), None) => {
                let described = model.describe_operation(&call.value, &call.value);
                format!("{described} (no return)")
            }
            _ => id.to_string(),
        }
    }
}

/// A linearizability checking engine.
pub trait Engine {
    /// Check `history` against `model` within `timeout`.
    ///
    /// The budget is a hard ceiling: on expiry the engine answers
    /// [`CheckResult::Unknown`] with whatever diagnostics it has.
    fn check<M: Model>(
        &self,
        model: Arc<M>,
        history: &History<M::Value>,
        timeout: Duration,
    ) -> Result<(CheckResult, LinearizationInfo<M::Value>), EngineError>;
}

/// Check every partition with `check_one` on a thread named `thread_name`.
///
/// `check_one` must poll the stop flag it is given and return
/// [`PartitionOutcome::Undecided`] once it is raised. A partition proven
/// illegal decides the whole history, even when the budget runs out before
/// the others are checked.
pub fn check_partitions<V, F>(
    partitions: Vec<History<V>>,
    timeout: Duration,
    thread_name: &str,
    check_one: F,
) -> Result<(CheckResult, LinearizationInfo<V>), EngineError>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&History<V>, &AtomicBool) -> Result<PartitionOutcome, EngineError> + Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let total = partitions.len();
    let mut info = LinearizationInfo::new(partitions.clone());
    debug!(partitions = total, ?timeout, "checking history");

    if total == 0 {
        return Ok((CheckResult::Ok, info));
    }
    if timeout.is_zero() {
        return Ok((CheckResult::Unknown, info));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    {
        let stop = Arc::clone(&stop);
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                for (index, partition) in partitions.iter().enumerate() {
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let outcome = check_one(partition, &stop);
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            })
            .map_err(EngineError::Spawn)?;
    }

    let mut undecided = false;
    for checked in 0..total {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let received = if remaining.is_zero() {
            Err(RecvTimeoutError::Timeout)
        } else {
            rx.recv_timeout(remaining)
        };

        match received {
            Ok((index, Ok(PartitionOutcome::Linearizable(order)))) => {
                debug!(partition = index, operations = order.len(), "partition linearizable");
                info.record_linearization(index, order);
            }
            Ok((index, Ok(PartitionOutcome::Illegal(prefixes)))) => {
                debug!(partition = index, "partition not linearizable");
                info.record_failure(index);
                for prefix in prefixes {
                    info.record_prefix(index, prefix);
                }
            }
            Ok((index, Ok(PartitionOutcome::Undecided))) => {
                debug!(partition = index, "partition undecided");
                undecided = true;
            }
            Ok((_, Err(e))) => {
                stop.store(true, Ordering::Relaxed);
                return Err(e);
            }
            Err(RecvTimeoutError::Timeout) => {
                stop.store(true, Ordering::Relaxed);
                debug!(checked, total, "time budget exhausted");
                undecided = true;
                break;
            }
            Err(RecvTimeoutError::Disconnected) => return Err(EngineError::WorkerLost),
        }
    }

    let result = if !info.failed_partitions().is_empty() {
        CheckResult::Failed
    } else if undecided {
        CheckResult::Unknown
    } else {
        CheckResult::Ok
    };
    Ok((result, info))
}

#[cfg(test)]
mod tests {
    use linlog_core::{Event, KvModel, Payload};

    use super::*;

    fn single_partition() -> History<Payload> {
        History::from_events(vec![
            Event::call(0u64, OperationId(0), Payload::write("x", "1")),
            Event::ret(0u64, OperationId(0), Payload::write("x", "1")),
            Event::call(1u64, OperationId(1), Payload::read("x")),
        ])
    }

    #[test]
    fn test_partial_linearizations_shape() {
        let mut info = LinearizationInfo::new(vec![single_partition(), single_partition()]);
        info.record_linearization(1, vec![OperationId(0), OperationId(1)]);
        info.record_failure(0);
        info.record_failure(0);

        let partials = info.partial_linearizations();
        assert_eq!(partials.len(), 2);
        assert!(partials[0].is_empty());
        assert_eq!(partials[1], vec![vec![OperationId(0), OperationId(1)]]);
        assert_eq!(info.failed_partitions(), &[0]);
        assert!(info.linearization(0).is_none());
        assert!(info.linearization(7).is_none());
    }

    #[test]
    fn test_failed_partition_reports_prefix() {
        let mut info = LinearizationInfo::new(vec![single_partition()]);
        info.record_failure(0);
        info.record_prefix(0, vec![OperationId(0)]);
        info.record_prefix(0, Vec::new());

        assert_eq!(info.prefixes(0), &[vec![OperationId(0)]]);
        assert!(info.prefixes(4).is_empty());
        assert_eq!(info.partial_linearizations(), vec![vec![vec![OperationId(0)]]]);
    }

    #[test]
    fn test_describe_operation() {
        let info = LinearizationInfo::new(vec![single_partition()]);
        assert_eq!(info.describe_operation(&KvModel, 0, OperationId(0)), "set(x, 1)");
        assert!(info
            .describe_operation(&KvModel, 0, OperationId(1))
            .ends_with("(no return)"));
        assert_eq!(info.describe_operation(&KvModel, 3, OperationId(1)), "#1");
    }

    #[test]
    fn test_annotations_are_kept() {
        let mut info: LinearizationInfo<Payload> = LinearizationInfo::new(Vec::new());
        info.add_annotations([Annotation::new(0u64, 0, 0, "Test Start")]);
        assert_eq!(info.annotations().len(), 1);
    }

    fn outcome_by_size(
        partition: &History<Payload>,
        _stop: &AtomicBool,
    ) -> Result<PartitionOutcome, EngineError> {
        Ok(match partition.len() {
            1 => PartitionOutcome::Illegal(vec![vec![OperationId(9)]]),
            2 => PartitionOutcome::Undecided,
            _ => PartitionOutcome::Linearizable(vec![OperationId(0)]),
        })
    }

    fn sized(len: usize) -> History<Payload> {
        History::from_events(single_partition().events()[..len].to_vec())
    }

    #[test]
    fn test_driver_combines_outcomes() {
        let (result, _) =
            check_partitions(vec![sized(3), sized(3)], Duration::from_secs(5), "t", outcome_by_size)
                .unwrap();
        assert_eq!(result, CheckResult::Ok);

        let (result, _) =
            check_partitions(vec![sized(3), sized(2)], Duration::from_secs(5), "t", outcome_by_size)
                .unwrap();
        assert_eq!(result, CheckResult::Unknown);

        let (result, info) =
            check_partitions(vec![sized(2), sized(1)], Duration::from_secs(5), "t", outcome_by_size)
                .unwrap();
        assert_eq!(result, CheckResult::Failed);
        assert_eq!(info.prefixes(1), &[vec![OperationId(9)]]);
    }

    #[test]
    fn test_driver_raises_stop_on_expiry() {
        let seen = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&seen);
        let start = Instant::now();
        let (result, _) = check_partitions(
            vec![single_partition()],
            Duration::from_millis(50),
            "t",
            move |_, stop: &AtomicBool| {
                while !stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(1));
                }
                flag.store(true, Ordering::Relaxed);
                Ok(PartitionOutcome::Undecided)
            },
        )
        .unwrap();
        assert_eq!(result, CheckResult::Unknown);
        assert!(start.elapsed() < Duration::from_secs(5));

        let waited = Instant::now();
        while !seen.load(Ordering::Relaxed) && waited.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(seen.load(Ordering::Relaxed));
    }

    #[test]
    fn test_zero_budget_checks_nothing() {
        let (result, info) = check_partitions(
            vec![single_partition()],
            Duration::ZERO,
            "t",
            |_, _: &AtomicBool| -> Result<PartitionOutcome, EngineError> {
                panic!("checker must not run")
            },
        )
        .unwrap();
        assert_eq!(result, CheckResult::Unknown);
        assert!(info.partial_linearizations().iter().all(Vec::is_empty));
    }
}
