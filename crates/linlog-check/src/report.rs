//! Diagnostics reporting.
//!
//! Prints the witness orderings found by the engine, lays out the events of
//! any partition that could not be linearized, requests a visualization
//! document, and finishes with the verdict line. A failed visualization is
//! logged and reported but never changes the verdict.

use std::io::{self, Write};
use std::path::Path;

use linlog_core::{render_timeline, Model};
use tracing::warn;

use crate::render::{JsonRenderer, Renderer};
use crate::verifier::{Verdict, Verification};

/// Writes human-readable diagnostics for a verification.
#[derive(Debug, Clone, Default)]
pub struct Reporter<R = JsonRenderer> {
    renderer: R,
}

impl Reporter<JsonRenderer> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: Renderer> Reporter<R> {
    pub fn with_renderer(renderer: R) -> Self {
        Self { renderer }
    }

    /// Report a verification to `out`.
    ///
    /// When `visualization` is set the renderer writes its artifact there.
    pub fn report<M: Model, W: Write>(
        &self,
        out: &mut W,
        verification: &Verification<M>,
        visualization: Option<&Path>,
    ) -> io::Result<()> {
        let model = verification.model.as_ref();
        let info = &verification.info;

        if let Some(path) = visualization {
            match self.renderer.render(model, info, path) {
                Ok(()) => writeln!(out, "Visualization saved to: {}", path.display())?,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "visualization failed");
                    writeln!(out, "Error generating visualization: {e}")?;
                }
            }
        }

        let partials = info.partial_linearizations();
        if partials.iter().any(|p| !p.is_empty()) {
            writeln!(out)?;
            writeln!(out, "Partial linearizations found:")?;
            for (i, partition) in partials.iter().enumerate() {
                writeln!(out, "Partition {i}:")?;
                for (j, sequence) in partition.iter().enumerate() {
                    let ops: Vec<String> = sequence
                        .iter()
                        .map(|&id| format!("{id} {}", info.describe_operation(model, i, id)))
                        .collect();
                    writeln!(out, "  Sequence {j}: [{}]", ops.join(", "))?;
                }
            }
        }

        for &index in info.failed_partitions() {
            writeln!(out)?;
            writeln!(out, "Partition {index} has no linearization:")?;
            let history = &info.partitions()[index];
            let diagram = render_timeline(history, |v| format!("{v:?}"));
            out.write_all(diagram.as_bytes())?;
        }

        writeln!(out)?;
        match verification.verdict {
            Verdict::Linearizable => writeln!(out, "Linearizability check passed!")?,
            Verdict::Violation(_) => writeln!(out, "Linearizability check failed!")?,
            Verdict::Inconclusive => writeln!(
                out,
                "Linearizability check timed out! (no conclusion within the time budget)"
            )?,
        }
        writeln!(
            out,
            "Checked {} events in {:.2}s",
            verification.events,
            verification.duration.as_secs_f64()
        )?;
        Ok(())
    }
}
