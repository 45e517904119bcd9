//! # linlog-check
//!
//! Linearizability verification for recorded key-value histories.
//!
//! A run flows through four stages:
//!
//! | Stage | Module | Produces |
//! |-------|--------|----------|
//! | parse | `linlog_core::parser` | log records |
//! | build | `linlog_core::history` | call/return history |
//! | check | [`verifier`] over an [`Engine`] | three-valued [`Verdict`] |
//! | report | [`report`] and [`render`] | diagnostics and a visualization document |
//!
//! The verdict is one of linearizable, not linearizable, or inconclusive
//! (the time budget ran out). Inconclusive is never reported as a pass.
//!
//! Two engines are provided: [`SearchEngine`], the default, and
//! [`StaterightEngine`], which delegates small partitions to stateright's
//! tester.

pub mod engine;
pub mod error;
pub mod render;
pub mod report;
pub mod search_engine;
pub mod stateright_engine;
pub mod verifier;

pub use engine::{check_partitions, CheckResult, Engine, LinearizationInfo, PartitionOutcome};
pub use error::{EngineError, RenderError, VerifyError};
pub use render::{JsonRenderer, Renderer, VisualizationDocument};
pub use report::Reporter;
pub use search_engine::SearchEngine;
pub use stateright_engine::StaterightEngine;
pub use verifier::{
    visualization_path, Verdict, Verification, Verifier, VerifierConfig, Witness,
    TIMEOUT_SECONDS_DEFAULT, VISUALIZATION_SUFFIX,
};
