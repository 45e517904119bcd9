//! Per-worker timeline rendering.
//!
//! Lays a history out as a table with one column per worker, one row per
//! event. Used to show the operations of a partition that could not be
//! linearized.

use crate::event::{EventKind, WorkerId};
use crate::history::History;

/// Render `history` as a thread diagram.
///
/// `describe` renders the value carried by each event.
///
/// ```text
/// Step | worker_0    | worker_1    |
/// -----|-------------|-------------|
///    1 | call #0 ... |             |
///    2 |             | call #1 ... |
/// ```
pub fn render_timeline<V, F>(history: &History<V>, describe: F) -> String
where
    F: Fn(&V) -> String,
{
    let workers = history.workers();
    if workers.is_empty() {
        return "(no events recorded)\n".to_string();
    }

    let cells: Vec<(WorkerId, String)> = history
        .events()
        .iter()
        .map(|e| {
            let verb = match e.kind {
                EventKind::Call => "call",
                EventKind::Return => "ret",
            };
            (e.worker, format!("{verb} {} {}", e.id, describe(&e.value)))
        })
        .collect();

    let width = cells
        .iter()
        .map(|(_, c)| c.chars().count())
        .chain(workers.iter().map(|w| w.to_string().len()))
        .max()
        .unwrap_or(0);

    let mut output = String::new();

    output.push_str("Step |");
    for worker in &workers {
        output.push_str(&format!(" {:width$} |", worker.to_string()));
    }
    output.push('\n');

    output.push_str("-----|");
    for _ in &workers {
        output.push_str(&format!("{}|", "-".repeat(width + 2)));
    }
    output.push('\n');

    for (step, (worker, cell)) in cells.iter().enumerate() {
        output.push_str(&format!("{:4} |", step + 1));
        for w in &workers {
            let text = if w == worker { cell.as_str() } else { "" };
            output.push_str(&format!(" {text:width$} |"));
        }
        output.push('\n');
    }

    output
}
