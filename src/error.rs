//! Error types for the AI Things Considered pipeline.

use crate::types::PanelIndex;
use std::path::PathBuf;
use thiserror::Error;

/// Collaborator-level errors (feed, reasoning backend, image backend)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Feed error: {0}")]
    FeedError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

/// Story selection errors. None of these are retried.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Need at least {required} stories to select from, got {available}")]
    NotEnoughStories { required: usize, available: usize },

    #[error("Selection request failed: {0}")]
    Backend(#[from] ApiError),

    #[error("Malformed selection: {0}")]
    Malformed(String),
}

/// Composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("Panel {panel} image could not be decoded: {message}")]
    PanelDecode { panel: PanelIndex, message: String },

    #[error("Failed to encode composite image: {0}")]
    Encode(String),

    #[error("Failed to load font {path:?}: {message}")]
    Font { path: PathBuf, message: String },
}

/// Diagnostic line for one panel, carried by threshold failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelDiagnostic {
    pub panel: PanelIndex,
    pub succeeded: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl std::fmt::Display for PanelDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = if self.succeeded { "ok" } else { "failed" };
        write!(
            f,
            "panel {} {} after {} attempt(s)",
            self.panel, status, self.attempts
        )?;
        if let Some(err) = &self.last_error {
            write!(f, ": {}", err)?;
        }
        Ok(())
    }
}

/// Run-level errors. Any of these aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Feed fetch failed: {0}")]
    Fetch(#[source] ApiError),

    #[error("Story selection failed: {0}")]
    Selection(#[from] SelectionError),

    #[error("Only {succeeded} of {total} panels rendered, {required} required:\n{}", format_diagnostics(.panels))]
    Threshold {
        succeeded: usize,
        required: usize,
        total: usize,
        panels: Vec<PanelDiagnostic>,
    },

    #[error("Composition failed: {0}")]
    Compose(#[from] ComposeError),

    #[error("Failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn format_diagnostics(panels: &[PanelDiagnostic]) -> String {
    panels
        .iter()
        .map(|p| format!("  {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_error_lists_every_panel() {
        let panels = vec![
            PanelDiagnostic {
                panel: PanelIndex::new(1).unwrap(),
                succeeded: true,
                attempts: 1,
                last_error: None,
            },
            PanelDiagnostic {
                panel: PanelIndex::new(2).unwrap(),
                succeeded: false,
                attempts: 3,
                last_error: Some("quota exhausted".to_string()),
            },
        ];
        let err = PipelineError::Threshold {
            succeeded: 1,
            required: 4,
            total: 6,
            panels,
        };
        let message = err.to_string();
        assert!(message.contains("Only 1 of 6 panels rendered, 4 required"));
        assert!(message.contains("panel 1 ok after 1 attempt(s)"));
        assert!(message.contains("panel 2 failed after 3 attempt(s): quota exhausted"));
    }
}
