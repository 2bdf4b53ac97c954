//! CLI output: error mapping from pipeline errors to stable CLI surface.

use crate::error::PipelineError;

/// One-line message for stderr. Multi-line detail (panel diagnostics) goes to the log.
pub fn map_error(e: &PipelineError) -> String {
    let message = e.to_string();
    let first_line = message.lines().next().unwrap_or_default();
    format!("error: {}", first_line)
}
