//! Engine backed by stateright's linearizability tester.
//!
//! Any [`Model`] is wrapped as a stateright `SequentialSpec` reference
//! object. The history is split with [`Model::partition`] and each partition
//! is replayed into a `LinearizabilityTester`; the whole history is
//! linearizable iff every partition is.
//!
//! The tester's search recurses once per operation, copies its remaining
//! history at every level, and cannot be interrupted. Partitions with more
//! than [`OPERATIONS_MAX`] operations are therefore left undecided, and the
//! stop flag is only honoured between partitions. Use it to cross-check
//! small histories; [`SearchEngine`](crate::search_engine::SearchEngine)
//! handles large ones.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use linlog_core::{EventKind, History, Model, OperationId};
use stateright::semantics::{ConsistencyTester, LinearizabilityTester, SequentialSpec};
use tracing::warn;

use crate::engine::{check_partitions, CheckResult, Engine, LinearizationInfo, PartitionOutcome};
use crate::error::EngineError;

/// Name of the checker thread.
const CHECKER_THREAD_NAME: &str = "linearizability-check";

/// Largest partition (in operations) handed to the tester.
pub const OPERATIONS_MAX: usize = 64;

/// A [`Model`] state viewed as a stateright reference object.
struct RefModel<M: Model> {
    model: Arc<M>,
    state: M::State,
}

impl<M: Model> Clone for RefModel<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
            state: self.state.clone(),
        }
    }
}

impl<M: Model> fmt::Debug for RefModel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.model.describe_state(&self.state))
    }
}

impl<M: Model> PartialEq for RefModel<M> {
    fn eq(&self, other: &Self) -> bool {
        self.model.equal(&self.state, &other.state)
    }
}

impl<M: Model> SequentialSpec for RefModel<M> {
    type Op = (OperationId, M::Value);
    type Ret = M::Value;

    fn invoke(&mut self, op: &Self::Op) -> Self::Ret {
        let (next, output) = self.model.invoke(&self.state, &op.1);
        self.state = next;
        output
    }

    fn is_valid_step(&mut self, op: &Self::Op, ret: &Self::Ret) -> bool {
        match self.model.step(&self.state, &op.1, ret) {
            Some(next) => {
                self.state = next;
                true
            }
            None => false,
        }
    }
}

/// Replay one partition and search for a linearization.
///
/// Returns the witness ordering, or `None` when none exists.
fn linearize<M: Model>(
    model: &Arc<M>,
    partition: &History<M::Value>,
) -> Result<Option<Vec<OperationId>>, EngineError> {
    let init = RefModel {
        model: Arc::clone(model),
        state: model.init(),
    };
    let mut tester = LinearizabilityTester::new(init);

    for event in partition.events() {
        match event.kind {
            EventKind::Call => {
                tester
                    .on_invoke(event.worker, (event.id, event.value.clone()))
                    .map_err(EngineError::Rejected)?;
            }
            EventKind::Return => {
                tester
                    .on_return(event.worker, event.value.clone())
                    .map_err(EngineError::Rejected)?;
            }
        }
    }

    Ok(tester
        .serialized_history()
        .map(|ops| ops.into_iter().map(|((id, _), _)| id).collect()))
}

/// Engine that delegates the search to stateright.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaterightEngine;

impl StaterightEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for StaterightEngine {
    fn check<M: Model>(
        &self,
        model: Arc<M>,
        history: &History<M::Value>,
        timeout: Duration,
    ) -> Result<(CheckResult, LinearizationInfo<M::Value>), EngineError> {
        let partitions = model.partition(history);
        check_partitions(partitions, timeout, CHECKER_THREAD_NAME, move |partition, stop| {
            if stop.load(Ordering::Relaxed) {
                return Ok(PartitionOutcome::Undecided);
            }
            let operations = partition.operation_count();
            if operations > OPERATIONS_MAX {
                warn!(
                    operations,
                    limit = OPERATIONS_MAX,
                    "partition too large for stateright tester"
                );
                return Ok(PartitionOutcome::Undecided);
            }
            Ok(match linearize(&model, partition)? {
                Some(order) => PartitionOutcome::Linearizable(order),
                None => PartitionOutcome::Illegal(Vec::new()),
            })
        })
    }
}
