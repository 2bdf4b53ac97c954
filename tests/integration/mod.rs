//! Integration tests for the AI Things Considered pipeline

mod config_integration;
mod model_providers;
mod pipeline_runs;
mod rotation;
mod test_utils;
