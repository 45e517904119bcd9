//! Diagnostic annotations on a worker's timeline.

use serde::Serialize;

use crate::event::WorkerId;

/// A marker attached to one worker's timeline between two operation indices.
///
/// Purely informational: annotations are carried into diagnostics and the
/// visualization document and never influence a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub worker: WorkerId,
    /// First operation index covered (inclusive).
    pub start: usize,
    /// Last operation index covered (inclusive).
    pub end: usize,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl Annotation {
    /// Create an annotation with default styling.
    pub fn new(
        worker: impl Into<WorkerId>,
        start: usize,
        end: usize,
        description: impl Into<String>,
    ) -> Self {
        debug_assert!(start <= end, "Annotation range must not be reversed");
        Self {
            worker: worker.into(),
            start,
            end,
            description: description.into(),
            text_color: None,
            background_color: None,
        }
    }

    /// Set the text color (CSS color string).
    #[must_use]
    pub fn with_text_color(mut self, color: impl Into<String>) -> Self {
        self.text_color = Some(color.into());
        self
    }

    /// Set the background color (CSS color string).
    #[must_use]
    pub fn with_background_color(mut self, color: impl Into<String>) -> Self {
        self.background_color = Some(color.into());
        self
    }
}
