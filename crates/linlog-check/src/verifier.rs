//! Verification orchestration.
//!
//! Drives an [`Engine`] over a history with a fixed time budget and turns
//! its three-valued answer into a [`Verdict`]. An empty history never reaches
//! the engine: it is reported as [`VerifyError::NoEvents`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use linlog_core::{build_history, parse_file, Annotation, History, KvModel, Model, OperationId};
use tracing::{info, instrument, warn};

use crate::engine::{CheckResult, Engine, LinearizationInfo};
use crate::error::VerifyError;
use crate::search_engine::SearchEngine;

/// Default time budget for one check (seconds).
pub const TIMEOUT_SECONDS_DEFAULT: u64 = 10;

/// Suffix appended to a log path to name its visualization document.
pub const VISUALIZATION_SUFFIX: &str = ".visualization.json";

/// Configuration for a verification run.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Hard ceiling on the engine call. Not retried.
    pub timeout: Duration,
    /// Whether callers should render a visualization document.
    pub visualize: bool,
    /// Annotations attached to the diagnostics of every run.
    pub annotations: Vec<Annotation>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(TIMEOUT_SECONDS_DEFAULT),
            visualize: true,
            annotations: Vec::new(),
        }
    }
}

impl VerifierConfig {
    /// Set the time budget.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable visualization.
    #[must_use]
    pub fn with_visualization(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    /// Add annotations.
    #[must_use]
    pub fn with_annotations(mut self, annotations: impl IntoIterator<Item = Annotation>) -> Self {
        self.annotations.extend(annotations);
        self
    }
}

/// A linearization witness for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Witness {
    pub partition: usize,
    pub operations: Vec<OperationId>,
}

/// Outcome of a verification run.
///
/// The three variants are mutually exclusive; `Inconclusive` carries no
/// correctness information in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Some sequential execution explains every observed return.
    Linearizable,
    /// No sequential execution does. Carries the witnesses found for the
    /// partitions that were linearizable.
    Violation(Vec<Witness>),
    /// The engine did not decide within the time budget.
    Inconclusive,
}

impl Verdict {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Linearizable => "linearizable",
            Verdict::Violation(_) => "not linearizable",
            Verdict::Inconclusive => "inconclusive",
        }
    }
}

/// Result of a completed run: the verdict plus everything needed to
/// explain it.
#[derive(Debug)]
pub struct Verification<M: Model> {
    pub verdict: Verdict,
    pub info: LinearizationInfo<M::Value>,
    pub model: Arc<M>,
    /// Events in the checked history.
    pub events: usize,
    /// Wall-clock time spent in the engine.
    pub duration: Duration,
}

/// Runs histories through a checking engine.
#[derive(Debug, Clone, Default)]
pub struct Verifier<E = SearchEngine> {
    engine: E,
    config: VerifierConfig,
}

impl Verifier<SearchEngine> {
    /// Create a verifier backed by the in-process search.
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self::with_engine(SearchEngine::new(), config)
    }
}

impl<E: Engine> Verifier<E> {
    /// Create a verifier with a specific engine.
    pub fn with_engine(engine: E, config: VerifierConfig) -> Self {
        Self { engine, config }
    }

    #[must_use]
    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Check a history against a model.
    pub fn verify<M: Model>(
        &self,
        model: M,
        history: &History<M::Value>,
    ) -> Result<Verification<M>, VerifyError> {
        if history.is_empty() {
            return Err(VerifyError::NoEvents);
        }

        let model = Arc::new(model);
        let start = Instant::now();
        let (result, mut info) = self
            .engine
            .check(Arc::clone(&model), history, self.config.timeout)?;
        let duration = start.elapsed();

        info.add_annotations(self.config.annotations.iter().cloned());

        let verdict = match result {
            CheckResult::Ok => Verdict::Linearizable,
            CheckResult::Failed => Verdict::Violation(witnesses(&info)),
            CheckResult::Unknown => {
                warn!(timeout = ?self.config.timeout, "check did not finish within budget");
                Verdict::Inconclusive
            }
        };
        info!(
            verdict = verdict.name(),
            events = history.len(),
            partitions = info.partitions().len(),
            elapsed_ms = duration.as_millis() as u64,
            "verification finished"
        );

        Ok(Verification {
            verdict,
            info,
            model,
            events: history.len(),
            duration,
        })
    }

    /// Parse a key-value log file and check it.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn verify_log(&self, path: &Path) -> Result<Verification<KvModel>, VerifyError> {
        let records = parse_file(path)?;
        let history = build_history(&records)?;
        self.verify(KvModel, &history)
    }
}

fn witnesses<V>(info: &LinearizationInfo<V>) -> Vec<Witness> {
    (0..info.partitions().len())
        .filter_map(|partition| {
            info.linearization(partition).map(|ops| Witness {
                partition,
                operations: ops.to_vec(),
            })
        })
        .collect()
}

/// Path of the visualization document for a log file.
#[must_use]
pub fn visualization_path(log: &Path) -> PathBuf {
    let mut name = log.as_os_str().to_os_string();
    name.push(VISUALIZATION_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use linlog_core::{Event, Payload};

    use super::*;
    use crate::error::EngineError;

    /// Engine that always answers the same thing.
    struct FixedEngine(CheckResult);

    impl Engine for FixedEngine {
        fn check<M: Model>(
            &self,
            _model: Arc<M>,
            history: &History<M::Value>,
            _timeout: Duration,
        ) -> Result<(CheckResult, LinearizationInfo<M::Value>), EngineError> {
            let mut info = LinearizationInfo::new(vec![history.clone()]);
            if self.0 == CheckResult::Failed {
                info.record_failure(0);
            }
            Ok((self.0, info))
        }
    }

    fn fixed(result: CheckResult, config: VerifierConfig) -> Verifier<FixedEngine> {
        Verifier::with_engine(FixedEngine(result), config)
    }

    fn one_read() -> History<Payload> {
        History::from_events(vec![
            Event::call(0u64, OperationId(0), Payload::read("x")),
            Event::ret(0u64, OperationId(0), Payload::read_result("x", "0")),
        ])
    }

    #[test]
    fn test_config_defaults() {
        let config = VerifierConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.visualize);
        assert!(config.annotations.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = VerifierConfig::default()
            .with_timeout(Duration::from_millis(250))
            .with_visualization(false)
            .with_annotations([Annotation::new(1u64, 0, 2, "warmup")]);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert!(!config.visualize);
        assert_eq!(config.annotations.len(), 1);
    }

    #[test]
    fn test_empty_history_is_no_events() {
        let verifier = fixed(CheckResult::Ok, VerifierConfig::default());
        let err = verifier.verify(KvModel, &History::new()).unwrap_err();
        assert!(matches!(err, VerifyError::NoEvents));
    }

    #[test]
    fn test_unknown_is_inconclusive() {
        let verifier = fixed(CheckResult::Unknown, VerifierConfig::default());
        let v = verifier.verify(KvModel, &one_read()).unwrap();
        assert_eq!(v.verdict, Verdict::Inconclusive);
        assert_ne!(v.verdict, Verdict::Linearizable);
        assert!(!matches!(v.verdict, Verdict::Violation(_)));
    }

    #[test]
    fn test_failed_is_violation() {
        let verifier = fixed(CheckResult::Failed, VerifierConfig::default());
        let v = verifier.verify(KvModel, &one_read()).unwrap();
        assert_eq!(v.verdict, Verdict::Violation(Vec::new()));
        assert_eq!(v.events, 2);
    }

    #[test]
    fn test_annotations_reach_diagnostics() {
        let config =
            VerifierConfig::default().with_annotations([Annotation::new(0u64, 0, 0, "Test Start")]);
        let verifier = fixed(CheckResult::Ok, config);
        let v = verifier.verify(KvModel, &one_read()).unwrap();
        assert_eq!(v.verdict, Verdict::Linearizable);
        assert_eq!(v.info.annotations()[0].description, "Test Start");
    }

    #[test]
    fn test_visualization_path() {
        assert_eq!(
            visualization_path(Path::new("logs/run.log")),
            PathBuf::from("logs/run.log.visualization.json")
        );
    }
}
