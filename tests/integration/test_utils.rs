//! Shared test utilities for integration tests
//!
//! Scripted collaborators and a pipeline harness writing into a temp directory.

use ai_things_considered::composition::encode_png;
use ai_things_considered::config::StripConfig;
use ai_things_considered::error::ApiError;
use ai_things_considered::feed::StoryFeed;
use ai_things_considered::pipeline::Pipeline;
use ai_things_considered::provider::{MockImageGenerator, MockProvider};
use ai_things_considered::references::ReferenceTable;
use ai_things_considered::render::RecordingSleeper;
use ai_things_considered::types::Story;
use async_trait::async_trait;
use chrono::NaiveDate;
use image::{Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;

pub const SELECT_FIRST_SIX: &str = "[1, 2, 3, 4, 5, 6]";

/// Feed returning a fixed list of stories
pub struct StaticFeed {
    stories: Result<Vec<Story>, String>,
}

impl StaticFeed {
    pub fn new(stories: Vec<Story>) -> Self {
        Self {
            stories: Ok(stories),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            stories: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl StoryFeed for StaticFeed {
    async fn fetch_stories(&self) -> Result<Vec<Story>, ApiError> {
        self.stories.clone().map_err(ApiError::FeedError)
    }
}

/// Stories titled "Story 01" .. so no title is a substring of another
pub fn stories(n: usize) -> Vec<Story> {
    (1..=n)
        .map(|i| Story {
            title: format!("Story {:02}", i),
            summary: format!("Something newsworthy happened, part {}.", i),
            source_url: format!("https://example.com/story-{}", i),
            published_at: None,
            author: None,
        })
        .collect()
}

pub fn solid_png(color: Rgb<u8>) -> Vec<u8> {
    encode_png(&RgbImage::from_pixel(20, 30, color)).unwrap()
}

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
}

pub fn config_for(output_dir: &Path) -> StripConfig {
    let mut config = StripConfig::default();
    config.output_dir = output_dir.to_path_buf();
    config
}

/// Everything a test needs to drive and inspect one pipeline
pub struct Harness {
    pub pipeline: Pipeline,
    pub reasoning: Arc<MockProvider>,
    pub images: Arc<MockImageGenerator>,
    pub sleeper: Arc<RecordingSleeper>,
}

pub fn harness(
    output_dir: &Path,
    feed: StaticFeed,
    selection_reply: &str,
    images: MockImageGenerator,
) -> Harness {
    let reasoning = Arc::new(MockProvider::new(vec![selection_reply.to_string()]));
    let images = Arc::new(images);
    let sleeper = Arc::new(RecordingSleeper::new());
    let pipeline = Pipeline::from_config(
        &config_for(output_dir),
        Arc::new(feed),
        reasoning.clone(),
        images.clone(),
        ReferenceTable::empty(),
    )
    .with_sleeper(sleeper.clone());

    Harness {
        pipeline,
        reasoning,
        images,
        sleeper,
    }
}
