//! CLI domain: parse, route and output only.
//! No pipeline logic; the route builds collaborators from configuration and runs the pipeline.

mod output;
mod parse;
mod route;

pub use output::map_error;
pub use parse::Cli;
pub use route::{load_config, RunContext};
