//! AI Things Considered: Daily Illustrated News Strip
//!
//! Turns a daily news feed into a six-panel illustrated strip. Stories are selected by a
//! reasoning backend, turned into image prompts (with likeness references for known
//! people), rendered panel by panel with retry and a partial-failure threshold, laid out
//! on a fixed grid and published with a rolling "latest" view.

pub mod cli;
pub mod composition;
pub mod config;
pub mod error;
pub mod feed;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod references;
pub mod render;
pub mod selection;
pub mod synthesis;
pub mod types;
