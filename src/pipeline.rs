//! Pipeline
//!
//! Sequences a run: fetch, select, synthesize, render, threshold check, compose,
//! publish. Stages run one after another; only synthesis and rendering fan out.

use crate::composition::{compose, encode_png, encode_web_jpeg, FontSet, Layout};
use crate::config::{SceneSource, StripConfig, WebConfig};
use crate::error::PipelineError;
use crate::feed::StoryFeed;
use crate::output::{OutputManager, Rotation};
use crate::provider::{ImageGenerator, ReasoningClient};
use crate::references::ReferenceTable;
use crate::render::{diagnostics, PanelRenderer, Sleeper, ThresholdCheck};
use crate::selection::{SelectionCriteria, StorySelector};
use crate::synthesis::PromptSynthesizer;
use crate::types::{format_date, ComicMetadata, PanelIndex, PanelOutcome, SelectedStory};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// Per-panel line of a run report
#[derive(Debug, Clone)]
pub struct PanelSummary {
    pub panel: PanelIndex,
    pub title: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// What a successful run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub date: NaiveDate,
    pub panels: Vec<PanelSummary>,
    pub succeeded: usize,
    pub rotation: Rotation,
    pub written: Vec<PathBuf>,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Strip for {}: {} of {} panels rendered ({})",
            format_date(self.date),
            self.succeeded,
            self.panels.len(),
            self.rotation
        )?;
        for panel in &self.panels {
            let status = if panel.succeeded { "ok" } else { "FAILED" };
            write!(
                f,
                "  [{}] {:<6} {} attempt(s)  {}",
                panel.panel, status, panel.attempts, panel.title
            )?;
            if let Some(err) = &panel.last_error {
                write!(f, "  ({})", err)?;
            }
            writeln!(f)?;
        }
        for path in &self.written {
            writeln!(f, "  wrote {}", path.display())?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    feed: Arc<dyn StoryFeed>,
    selector: StorySelector,
    synthesizer: PromptSynthesizer,
    renderer: PanelRenderer,
    references: ReferenceTable,
    output: OutputManager,
    layout: Layout,
    fonts: Option<FontSet>,
    web: WebConfig,
    title: String,
    threshold: ThresholdCheck,
}

impl Pipeline {
    pub fn from_config(
        config: &StripConfig,
        feed: Arc<dyn StoryFeed>,
        reasoning: Arc<dyn ReasoningClient>,
        images: Arc<dyn ImageGenerator>,
        references: ReferenceTable,
    ) -> Self {
        let synthesizer = match config.synthesis.scene_source {
            SceneSource::Derived => PromptSynthesizer::new(config.style.preamble.clone()),
            SceneSource::Reasoning => {
                PromptSynthesizer::with_reasoning(config.style.preamble.clone(), reasoning.clone())
            }
        };

        Self {
            feed,
            selector: StorySelector::new(reasoning, SelectionCriteria::from_config(config)),
            synthesizer,
            renderer: PanelRenderer::new(images, &config.render, &config.image),
            references,
            output: OutputManager::new(config.output_dir.clone()),
            layout: Layout::default(),
            fonts: FontSet::from_config(&config.fonts),
            web: config.web.clone(),
            title: config.style.title.clone(),
            threshold: ThresholdCheck::new(config.render.min_success),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.renderer = self.renderer.with_sleeper(sleeper);
        self
    }

    pub async fn run(&self, date: NaiveDate) -> Result<RunReport, PipelineError> {
        let span = info_span!("run", date = %format_date(date));
        self.run_stages(date).instrument(span).await
    }

    async fn run_stages(&self, date: NaiveDate) -> Result<RunReport, PipelineError> {
        info!("Fetching stories");
        let stories = self.feed.fetch_stories().await.map_err(PipelineError::Fetch)?;
        info!(stories = stories.len(), "Fetched stories");

        let selected = self.selector.select(&stories).await?;

        info!(references = self.references.len(), "Synthesizing prompts");
        let prompts = self
            .synthesizer
            .synthesize_all(&selected, &self.references)
            .await;

        let outcomes = self.renderer.render_all(&prompts).await;
        for outcome in outcomes.iter().filter(|o| !o.is_success()) {
            warn!(
                panel = %outcome.panel_index,
                attempts = outcome.attempts,
                error = outcome.last_error.as_deref().unwrap_or("unknown"),
                "Panel did not render"
            );
        }

        let succeeded = match self.threshold.evaluate(&outcomes) {
            Ok(succeeded) => succeeded,
            Err(err) => {
                for line in diagnostics(&outcomes) {
                    error!(%line, "Panel diagnostic");
                }
                return Err(err);
            }
        };
        info!(succeeded, total = outcomes.len(), "Composing strip");

        let strip = compose(&outcomes, date, &self.title, &self.layout, self.fonts.as_ref())?;
        let png = encode_png(&strip)?;
        let web_jpeg = if self.web.enabled {
            Some(encode_web_jpeg(&strip, &self.web)?)
        } else {
            None
        };
        let metadata = ComicMetadata::from_outcomes(date, &selected, &outcomes);

        let report = self
            .output
            .publish(date, &png, web_jpeg.as_deref(), &metadata)?;

        Ok(RunReport {
            date,
            panels: summarize(&selected, &outcomes),
            succeeded,
            rotation: report.rotation,
            written: report.written,
        })
    }
}

fn summarize(selected: &[SelectedStory], outcomes: &[PanelOutcome]) -> Vec<PanelSummary> {
    outcomes
        .iter()
        .map(|o| PanelSummary {
            panel: o.panel_index,
            title: selected
                .iter()
                .find(|s| s.panel_index == o.panel_index)
                .map(|s| s.story.title.clone())
                .unwrap_or_default(),
            succeeded: o.is_success(),
            attempts: o.attempts,
            last_error: o.last_error.clone(),
        })
        .collect()
}
