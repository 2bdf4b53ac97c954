//! CLI route: configuration assembly and run context. Builds the production
//! collaborators and hands them to the pipeline.

use crate::cli::parse::Cli;
use crate::config::{ConfigLoader, StripConfig};
use crate::error::PipelineError;
use crate::feed::RssFeed;
use crate::pipeline::{Pipeline, RunReport};
use crate::provider::ProviderFactory;
use crate::references::ReferenceTable;
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Load layered configuration, fold in CLI overrides and validate.
pub fn load_config(cli: &Cli) -> Result<StripConfig, PipelineError> {
    let mut config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(Path::new("."))?,
    };

    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(manifest) = &cli.references {
        config.references.manifest = Some(manifest.clone());
    }

    let logging = &mut config.logging;
    if cli.quiet {
        logging.level = "off".to_string();
    } else if cli.verbose {
        logging.level = "debug".to_string();
    }
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        logging.file = Some(file.clone());
    }

    config
        .ensure_valid()
        .map_err(|e| PipelineError::Config(e.to_string()))?;
    Ok(config)
}

/// Runtime context for one CLI invocation: validated configuration and the target date.
pub struct RunContext {
    config: StripConfig,
    date: NaiveDate,
}

impl RunContext {
    /// `date` defaults to today in local time.
    pub fn new(config: StripConfig, date: Option<NaiveDate>) -> Self {
        Self {
            config,
            date: date.unwrap_or_else(|| chrono::Local::now().date_naive()),
        }
    }

    pub fn config(&self) -> &StripConfig {
        &self.config
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Run the pipeline to completion on a multi-threaded runtime.
    pub fn execute(&self) -> Result<RunReport, PipelineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to start async runtime: {}", e)))?;
        runtime.block_on(self.run())
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let pipeline = self.build_pipeline()?;
        info!(date = %self.date, output_dir = %self.config.output_dir.display(), "Starting run");
        pipeline.run(self.date).await
    }

    fn build_pipeline(&self) -> Result<Pipeline, PipelineError> {
        let config = &self.config;
        let to_config_error = |e: crate::error::ApiError| PipelineError::Config(e.to_string());

        let feed = Arc::new(RssFeed::new(&config.feed).map_err(to_config_error)?);
        let reasoning =
            ProviderFactory::reasoning_client(&config.reasoning).map_err(to_config_error)?;
        let images = ProviderFactory::image_generator(&config.image).map_err(to_config_error)?;
        let references = match &config.references.manifest {
            Some(path) => ReferenceTable::load(path).map_err(to_config_error)?,
            None => ReferenceTable::empty(),
        };

        Ok(Pipeline::from_config(
            config, feed, reasoning, images, references,
        ))
    }
}
