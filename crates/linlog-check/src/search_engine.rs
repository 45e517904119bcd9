//! Engine running a memoized linearization search.
//!
//! Wing and Gong's search with Lowe's state cache. A partition's events
//! sit in a doubly linked list in log order. Linearizing an operation lifts
//! its call and return out of the list and restarts the scan at the head;
//! reaching a return (or the end of the list) means the operation it closes
//! cannot go next, so the last choice is undone. A pair of linearized set and
//! model state that was already explored is skipped.
//!
//! The search keeps its own explicit stack, so its depth is bounded by
//! memory rather than the thread stack, and it polls the stop flag on every
//! step so an expired budget also ends its work.
//!
//! Operations that never returned may be linearized at any point after
//! their call (with the model's own response) or left out entirely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linlog_core::{EventKind, History, Model, OperationId};

use crate::engine::{check_partitions, CheckResult, Engine, LinearizationInfo, PartitionOutcome};
use crate::error::EngineError;

/// Name of the checker thread.
const CHECKER_THREAD_NAME: &str = "linearizability-search";

/// List index of the head sentinel.
const HEAD: usize = 0;

/// Set of operation indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OpSet(Vec<u64>);

impl OpSet {
    fn with_capacity(operations: usize) -> Self {
        Self(vec![0; operations.div_ceil(64)])
    }

    fn insert(&mut self, op: usize) {
        self.0[op / 64] |= 1u64 << (op % 64);
    }

    fn remove(&mut self, op: usize) {
        self.0[op / 64] &= !(1u64 << (op % 64));
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    /// Index into the partition's events; unused for sentinels.
    event: usize,
    /// Dense operation index; unused for sentinels.
    op: usize,
    is_call: bool,
    /// For a call, the list index of its return, if it has one.
    matching: Option<usize>,
}

/// Events of one partition as a linked list with undoable removal.
struct EventList {
    nodes: Vec<Node>,
    prev: Vec<usize>,
    next: Vec<usize>,
    operations: usize,
    completed: usize,
}

impl EventList {
    fn new<V>(partition: &History<V>) -> Self {
        let sentinel = Node {
            event: 0,
            op: 0,
            is_call: false,
            matching: None,
        };
        let mut nodes = vec![sentinel];
        let mut dense: HashMap<OperationId, (usize, usize)> = HashMap::new();
        let mut completed = 0;

        for (event, e) in partition.events().iter().enumerate() {
            let index = nodes.len();
            match e.kind {
                EventKind::Call => {
                    let op = dense.len();
                    dense.insert(e.id, (op, index));
                    nodes.push(Node {
                        event,
                        op,
                        is_call: true,
                        matching: None,
                    });
                }
                EventKind::Return => {
                    let Some(&(op, call)) = dense.get(&e.id) else {
                        continue;
                    };
                    nodes[call].matching = Some(index);
                    completed += 1;
                    nodes.push(Node {
                        event,
                        op,
                        is_call: false,
                        matching: None,
                    });
                }
            }
        }
        // Tail sentinel: never a call, so reaching it backtracks.
        nodes.push(sentinel);

        let len = nodes.len();
        let prev = (0..len).map(|i| i.saturating_sub(1)).collect();
        let next = (0..len).map(|i| (i + 1).min(len - 1)).collect();
        Self {
            nodes,
            prev,
            next,
            operations: dense.len(),
            completed,
        }
    }

    fn first(&self) -> usize {
        self.next[HEAD]
    }

    fn unlink(&mut self, n: usize) {
        let (p, x) = (self.prev[n], self.next[n]);
        self.next[p] = x;
        self.prev[x] = p;
    }

    fn relink(&mut self, n: usize) {
        let (p, x) = (self.prev[n], self.next[n]);
        self.next[p] = n;
        self.prev[x] = n;
    }

    /// Remove a call and its return. Undone by [`EventList::unlift`] in
    /// reverse order.
    fn lift(&mut self, call: usize) {
        self.unlink(call);
        if let Some(ret) = self.nodes[call].matching {
            self.unlink(ret);
        }
    }

    fn unlift(&mut self, call: usize) {
        if let Some(ret) = self.nodes[call].matching {
            self.relink(ret);
        }
        self.relink(call);
    }
}

/// Search one partition for a linearization.
fn search<M: Model>(
    model: &M,
    partition: &History<M::Value>,
    stop: &AtomicBool,
) -> PartitionOutcome {
    let events = partition.events();
    let mut list = EventList::new(partition);
    let mut linearized = OpSet::with_capacity(list.operations);
    let mut cache: HashMap<OpSet, Vec<M::State>> = HashMap::new();
    let mut calls: Vec<(usize, M::State)> = Vec::new();
    let mut longest: Vec<OperationId> = Vec::new();
    let mut remaining = list.completed;
    let mut state = model.init();
    let mut node = list.first();

    let ids = |calls: &[(usize, M::State)], list: &EventList| -> Vec<OperationId> {
        calls.iter().map(|&(n, _)| events[list.nodes[n].event].id).collect()
    };

    while remaining > 0 {
        if stop.load(Ordering::Relaxed) {
            return PartitionOutcome::Undecided;
        }

        let current = list.nodes[node];
        if current.is_call {
            let input = &events[current.event].value;
            let next_state = match current.matching {
                Some(ret) => model.step(&state, input, &events[list.nodes[ret].event].value),
                None => Some(model.invoke(&state, input).0),
            };
            if let Some(next_state) = next_state {
                let mut key = linearized.clone();
                key.insert(current.op);
                let explored = cache
                    .get(&key)
                    .is_some_and(|states| states.iter().any(|s| model.equal(s, &next_state)));
                if !explored {
                    cache.entry(key).or_default().push(next_state.clone());
                    linearized.insert(current.op);
                    if current.matching.is_some() {
                        remaining -= 1;
                    }
                    calls.push((node, std::mem::replace(&mut state, next_state)));
                    list.lift(node);
                    node = list.first();
                    continue;
                }
            }
            node = list.next[node];
        } else {
            if calls.len() > longest.len() {
                longest = ids(&calls, &list);
            }
            let Some((call, previous)) = calls.pop() else {
                let prefixes = if longest.is_empty() { Vec::new() } else { vec![longest] };
                return PartitionOutcome::Illegal(prefixes);
            };
            let undone = list.nodes[call];
            state = previous;
            linearized.remove(undone.op);
            if undone.matching.is_some() {
                remaining += 1;
            }
            list.unlift(call);
            node = list.next[call];
        }
    }

    PartitionOutcome::Linearizable(ids(&calls, &list))
}

/// Engine running the memoized search in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchEngine;

impl SearchEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Engine for SearchEngine {
    fn check<M: Model>(
        &self,
        model: Arc<M>,
        history: &History<M::Value>,
        timeout: Duration,
    ) -> Result<(CheckResult, LinearizationInfo<M::Value>), EngineError> {
        let partitions = model.partition(history);
        check_partitions(partitions, timeout, CHECKER_THREAD_NAME, move |partition, stop| {
            Ok(search(model.as_ref(), partition, stop))
        })
    }
}
