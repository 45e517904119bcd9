//! Call and return events.
//!
//! An [`Event`] is one half of an operation: the `Call` records what a worker
//! asked for, the matching `Return` records what the system answered. Both
//! halves carry the same [`OperationId`].

use std::fmt;

use serde::Serialize;

/// Identity of a concurrent actor (client or thread) in the log.
///
/// Unique per logical actor, not per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl From<u64> for WorkerId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker_{}", self.0)
    }
}

/// Identifier assigned to an operation when its call is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct OperationId(pub usize);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which half of an operation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Call,
    Return,
}

/// Register operation performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// `set(key, value)`
    Write,
    /// `get(key)`
    Read,
}

/// Value carried by a key-value register event.
///
/// At call time a write holds the value being written and a read holds an
/// empty value. At return time `value` is what the operation reported: the
/// echoed value for a write, the observed value for a read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Payload {
    pub op: OpKind,
    pub key: String,
    pub value: String,
}

impl Payload {
    /// Input of a write.
    pub fn write(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: OpKind::Write,
            key: key.into(),
            value: value.into(),
        }
    }

    /// Input of a read.
    pub fn read(key: impl Into<String>) -> Self {
        Self {
            op: OpKind::Read,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Output of a read that observed `value`.
    pub fn read_result(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            op: OpKind::Read,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A single call or return record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event<V> {
    /// Worker that issued the operation.
    pub worker: WorkerId,
    pub kind: EventKind,
    /// Shared by a call and its matching return.
    pub id: OperationId,
    pub value: V,
}

impl<V> Event<V> {
    pub fn call(worker: impl Into<WorkerId>, id: OperationId, value: V) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Call,
            id,
            value,
        }
    }

    pub fn ret(worker: impl Into<WorkerId>, id: OperationId, value: V) -> Self {
        Self {
            worker: worker.into(),
            kind: EventKind::Return,
            id,
            value,
        }
    }

    #[must_use]
    pub fn is_call(&self) -> bool {
        self.kind == EventKind::Call
    }
}
