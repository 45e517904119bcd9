//! Visualization documents.
//!
//! A [`Renderer`] turns check diagnostics into an artifact on disk. The
//! shipped [`JsonRenderer`] writes a self-contained JSON document with every
//! partition's operations, its witness ordering (with the model state after
//! each step) and the caller's annotations, for consumption by an external
//! viewer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use linlog_core::{Annotation, EventKind, Model, OperationId, WorkerId};
use serde::Serialize;

use crate::engine::LinearizationInfo;
use crate::error::RenderError;

/// Produces a visualization artifact for a check.
pub trait Renderer {
    fn render<M: Model>(
        &self,
        model: &M,
        info: &LinearizationInfo<M::Value>,
        path: &Path,
    ) -> Result<(), RenderError>;
}

/// Top-level visualization document.
#[derive(Debug, Serialize)]
pub struct VisualizationDocument {
    pub partitions: Vec<PartitionView>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Serialize)]
pub struct PartitionView {
    pub index: usize,
    /// Proven not linearizable.
    pub failed: bool,
    pub operations: Vec<OperationView>,
    /// Witness ordering, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linearization: Option<Vec<StepView>>,
    /// Longest legal prefix of a failed partition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<Vec<StepView>>,
}

#[derive(Debug, Serialize)]
pub struct OperationView {
    pub id: OperationId,
    pub worker: WorkerId,
    /// Position of the call within the partition's events.
    pub call: usize,
    /// Position of the return, absent for operations that never completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ret: Option<usize>,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct StepView {
    pub id: OperationId,
    pub description: String,
    /// Model state after this step.
    pub state: String,
}

impl VisualizationDocument {
    /// Build the document for a set of diagnostics.
    pub fn build<M: Model>(model: &M, info: &LinearizationInfo<M::Value>) -> Self {
        let partitions = info
            .partitions()
            .iter()
            .enumerate()
            .map(|(index, history)| {
                let mut operations: Vec<OperationView> = Vec::new();
                for (pos, event) in history.events().iter().enumerate() {
                    match event.kind {
                        EventKind::Call => operations.push(OperationView {
                            id: event.id,
                            worker: event.worker,
                            call: pos,
                            ret: None,
                            description: info.describe_operation(model, index, event.id),
                        }),
                        EventKind::Return => {
                            if let Some(op) = operations.iter_mut().find(|o| o.id == event.id) {
                                op.ret = Some(pos);
                            }
                        }
                    }
                }

                PartitionView {
                    index,
                    failed: info.failed_partitions().contains(&index),
                    operations,
                    linearization: info
                        .linearization(index)
                        .map(|order| replay(model, info, index, order)),
                    prefix: info
                        .prefixes(index)
                        .first()
                        .map(|order| replay(model, info, index, order)),
                }
            })
            .collect();

        Self {
            partitions,
            annotations: info.annotations().to_vec(),
        }
    }
}

/// Walk an ordering through the model, recording each state.
fn replay<M: Model>(
    model: &M,
    info: &LinearizationInfo<M::Value>,
    partition: usize,
    order: &[OperationId],
) -> Vec<StepView> {
    let history = &info.partitions()[partition];
    let mut state = model.init();
    let mut steps = Vec::with_capacity(order.len());

    for &id in order {
        let Some(call) = history.call_of(id) else {
            break;
        };
        let next = match history.return_of(id) {
            Some(ret) => model.step(&state, &call.value, &ret.value),
            None => Some(model.invoke(&state, &call.value).0),
        };
        let Some(next) = next else {
            break;
        };
        state = next;
        steps.push(StepView {
            id,
            description: info.describe_operation(model, partition, id),
            state: model.describe_state(&state),
        });
    }
    steps
}

/// Writes the visualization as pretty-printed JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render<M: Model>(
        &self,
        model: &M,
        info: &LinearizationInfo<M::Value>,
        path: &Path,
    ) -> Result<(), RenderError> {
        let document = VisualizationDocument::build(model, info);
        let io_err = |source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &document)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use linlog_core::{build_history, parse_lines, KvModel};

    use super::*;

    fn info() -> LinearizationInfo<linlog_core::Payload> {
        let history = build_history(
            &parse_lines([
                "INFO worker_0 Setting x = 1",
                "INFO worker_0 Set x = 1",
                "INFO worker_1 Getting x",
                "INFO worker_1 Get x = 1",
                "INFO worker_2 Setting y = 2",
                "INFO worker_2 Set y = 2",
                "INFO worker_3 Getting y",
            ])
            .unwrap(),
        )
        .unwrap();
        let mut info = LinearizationInfo::new(KvModel.partition(&history));
        info.record_linearization(0, vec![OperationId(0), OperationId(1)]);
        info.record_failure(1);
        info.record_prefix(1, vec![OperationId(2)]);
        info.add_annotations([Annotation::new(0u64, 0, 0, "Test Start")]);
        info
    }

    #[test]
    fn test_document_contents() {
        let doc = VisualizationDocument::build(&KvModel, &info());
        assert_eq!(doc.partitions.len(), 2);

        let x = &doc.partitions[0];
        assert!(!x.failed);
        assert_eq!(x.operations.len(), 2);
        assert_eq!(x.operations[1].call, 2);
        assert_eq!(x.operations[1].ret, Some(3));
        let steps = x.linearization.as_ref().unwrap();
        assert_eq!(steps[0].state, "{x=1}");
        assert_eq!(steps[1].description, "get(x) \u{2192} 1");

        let y = &doc.partitions[1];
        assert!(y.failed);
        assert_eq!(y.operations[1].ret, None);
        assert!(y.linearization.is_none());
        let prefix = y.prefix.as_ref().unwrap();
        assert_eq!(prefix.len(), 1);
        assert_eq!(prefix[0].state, "{y=2}");
        assert!(x.prefix.is_none());
        assert_eq!(doc.annotations.len(), 1);
    }

    #[test]
    fn test_json_renderer_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log.visualization.json");
        JsonRenderer.render(&KvModel, &info(), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["partitions"].as_array().unwrap().len(), 2);
        assert_eq!(written["annotations"][0]["description"], "Test Start");
        assert_eq!(written["partitions"][0]["linearization"][1]["id"], 1);
        assert!(written["partitions"][0].get("prefix").is_none());
        assert_eq!(written["partitions"][1]["prefix"][0]["id"], 2);
    }

    #[test]
    fn test_json_renderer_reports_io_error() {
        let err = JsonRenderer
            .render(&KvModel, &info(), Path::new("/nonexistent/linlog/out.json"))
            .unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }
}
