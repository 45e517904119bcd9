//! Sequential specifications.
//!
//! A [`Model`] is the abstract state machine a concurrent object must appear
//! to implement. Checkers replay candidate orderings of a history through
//! [`Model::step`]; an ordering survives only if every observed output is a
//! legal response at its position.
//!
//! [`KvModel`] is the key-value register: writes always succeed and echo the
//! written value, reads must observe the latest written value or the default
//! `"0"` for a key that was never written.

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use crate::event::{OpKind, Payload};
use crate::history::History;

/// Value of a key that has never been written.
pub const DEFAULT_VALUE: &str = "0";

/// A sequential specification.
///
/// States are values: `step` and `invoke` return a new state and never
/// modify their input, so a search can hold many branches at once.
pub trait Model: Send + Sync + 'static {
    /// Input and output of an operation (the event payload).
    type Value: Clone + Debug + PartialEq + Send + Sync + 'static;
    /// Abstract state.
    type State: Clone + Debug + Send + Sync + 'static;

    /// Initial state.
    fn init(&self) -> Self::State;

    /// Apply `input` observed to produce `output`.
    ///
    /// Returns the next state, or `None` when `output` is not a legal
    /// response to `input` in `state`.
    fn step(
        &self,
        state: &Self::State,
        input: &Self::Value,
        output: &Self::Value,
    ) -> Option<Self::State>;

    /// Response the model itself gives to `input` in `state`.
    ///
    /// Used for operations whose return was never observed.
    fn invoke(&self, state: &Self::State, input: &Self::Value) -> (Self::State, Self::Value);

    /// State equivalence.
    fn equal(&self, a: &Self::State, b: &Self::State) -> bool;

    /// Split a history into independently checkable sub-histories.
    fn partition(&self, history: &History<Self::Value>) -> Vec<History<Self::Value>> {
        vec![history.clone()]
    }

    /// Render an operation and its result.
    fn describe_operation(&self, input: &Self::Value, output: &Self::Value) -> String;

    /// Render a state.
    fn describe_state(&self, state: &Self::State) -> String;
}

/// Key-value register state.
///
/// Shared and copy-on-write: cloning is a reference-count bump, and a write
/// copies the map only when another branch still holds it.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct KvState(Arc<BTreeMap<String, String>>);

impl KvState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`, or [`DEFAULT_VALUE`] when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map_or(DEFAULT_VALUE, String::as_str)
    }

    /// A new state with `key` mapped to `value`.
    #[must_use]
    pub fn with(&self, key: &str, value: &str) -> Self {
        let mut map = Arc::clone(&self.0);
        Arc::make_mut(&mut map).insert(key.to_string(), value.to_string());
        Self(map)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for KvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for KvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

/// The key-value register specification.
#[derive(Debug, Clone, Copy, Default)]
pub struct KvModel;

impl Model for KvModel {
    type Value = Payload;
    type State = KvState;

    fn init(&self) -> KvState {
        KvState::new()
    }

    fn step(&self, state: &KvState, input: &Payload, output: &Payload) -> Option<KvState> {
        if input.op != output.op || input.key != output.key {
            return None;
        }
        match input.op {
            // A write is always legal; its return must echo the written value.
            OpKind::Write => {
                (output.value == input.value).then(|| state.with(&input.key, &input.value))
            }
            OpKind::Read => (output.value == state.get(&input.key)).then(|| state.clone()),
        }
    }

    fn invoke(&self, state: &KvState, input: &Payload) -> (KvState, Payload) {
        match input.op {
            OpKind::Write => (
                state.with(&input.key, &input.value),
                Payload::write(input.key.clone(), input.value.clone()),
            ),
            OpKind::Read => (
                state.clone(),
                Payload::read_result(input.key.clone(), state.get(&input.key)),
            ),
        }
    }

    fn equal(&self, a: &KvState, b: &KvState) -> bool {
        a == b
    }

    /// Keys are independent registers.
    fn partition(&self, history: &History<Payload>) -> Vec<History<Payload>> {
        history.partition_by(|p| p.key.clone())
    }

    fn describe_operation(&self, input: &Payload, output: &Payload) -> String {
        match input.op {
            OpKind::Write => format!("set({}, {})", input.key, input.value),
            OpKind::Read => format!("get({}) \u{2192} {}", input.key, output.value),
        }
    }

    fn describe_state(&self, state: &KvState) -> String {
        state.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay(ops: &[(Payload, Payload)]) -> Option<KvState> {
        let model = KvModel;
        ops.iter()
            .try_fold(model.init(), |state, (input, output)| model.step(&state, input, output))
    }

    #[test]
    fn test_unwritten_key_reads_default() {
        let state = replay(&[(Payload::read("x"), Payload::read_result("x", "0"))]);
        assert!(state.is_some());
        assert!(state.unwrap().is_empty());
    }

    #[test]
    fn test_unwritten_key_rejects_other_value() {
        assert!(replay(&[(Payload::read("x"), Payload::read_result("x", "7"))]).is_none());
    }

    #[test]
    fn test_read_observes_last_write() {
        let ok = replay(&[
            (Payload::write("x", "1"), Payload::write("x", "1")),
            (Payload::write("x", "5"), Payload::write("x", "5")),
            (Payload::read("x"), Payload::read_result("x", "5")),
        ]);
        assert_eq!(ok.unwrap().get("x"), "5");

        let stale = replay(&[
            (Payload::write("x", "1"), Payload::write("x", "1")),
            (Payload::write("x", "5"), Payload::write("x", "5")),
            (Payload::read("x"), Payload::read_result("x", "1")),
        ]);
        assert!(stale.is_none());
    }

    #[test]
    fn test_write_must_echo_value() {
        assert!(replay(&[(Payload::write("x", "1"), Payload::write("x", "2"))]).is_none());
    }

    #[test]
    fn test_keys_are_independent() {
        let state = replay(&[
            (Payload::write("x", "1"), Payload::write("x", "1")),
            (Payload::read("y"), Payload::read_result("y", "0")),
        ]);
        assert!(state.is_some());
    }

    #[test]
    fn test_write_does_not_touch_previous_state() {
        let before = KvState::new().with("x", "1");
        let after = before.with("x", "2");
        assert_eq!(before.get("x"), "1");
        assert_eq!(after.get("x"), "2");
    }

    #[test]
    fn test_invoke_matches_step() {
        let model = KvModel;
        let state = model.init().with("x", "3");
        let (next, out) = model.invoke(&state, &Payload::read("x"));
        assert_eq!(out.value, "3");
        assert_eq!(model.step(&state, &Payload::read("x"), &out), Some(next));

        let (next, out) = model.invoke(&state, &Payload::write("x", "4"));
        assert_eq!(model.step(&state, &Payload::write("x", "4"), &out), Some(next));
    }

    #[test]
    fn test_descriptions() {
        let model = KvModel;
        assert_eq!(
            model.describe_operation(&Payload::write("x", "5"), &Payload::write("x", "5")),
            "set(x, 5)"
        );
        assert_eq!(
            model.describe_operation(&Payload::read("x"), &Payload::read_result("x", "5")),
            "get(x) \u{2192} 5"
        );
        let state = KvState::new().with("b", "2").with("a", "1");
        assert_eq!(model.describe_state(&state), "{a=1, b=2}");
        assert_eq!(model.describe_state(&KvState::new()), "{}");
    }
}
