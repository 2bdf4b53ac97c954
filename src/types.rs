//! Core data model shared across pipeline stages.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Number of panels in a strip
pub const PANEL_COUNT: usize = 6;

/// A raw news item as produced by the feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub summary: String,
    pub source_url: String,
    pub published_at: Option<DateTime<FixedOffset>>,
    pub author: Option<String>,
}

/// Panel position in the strip, always in `1..=6`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PanelIndex(u8);

impl PanelIndex {
    pub fn new(value: u8) -> Option<Self> {
        if (1..=PANEL_COUNT as u8).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Build from a zero-based slot
    pub fn from_slot(slot: usize) -> Option<Self> {
        u8::try_from(slot + 1).ok().and_then(Self::new)
    }

    /// All panel indices in ascending order
    pub fn all() -> impl Iterator<Item = PanelIndex> {
        (1..=PANEL_COUNT as u8).map(PanelIndex)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based grid slot
    pub fn slot(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl TryFrom<u8> for PanelIndex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PanelIndex::new(value)
            .ok_or_else(|| format!("panel index {} outside 1..={}", value, PANEL_COUNT))
    }
}

impl From<PanelIndex> for u8 {
    fn from(value: PanelIndex) -> Self {
        value.0
    }
}

impl std::fmt::Display for PanelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A story bound to a panel by the selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedStory {
    pub story: Story,
    pub panel_index: PanelIndex,
    pub rationale: String,
}

/// Likeness record for a known person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub canonical_name: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    pub features: String,
}

/// Image-generation prompt for one panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompt {
    pub panel_index: PanelIndex,
    pub text: String,
    pub reference_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanelStatus {
    Success,
    Failed,
}

/// Terminal result of rendering one panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelOutcome {
    pub panel_index: PanelIndex,
    pub status: PanelStatus,
    pub image_bytes: Option<Vec<u8>>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl PanelOutcome {
    pub fn success(panel_index: PanelIndex, image_bytes: Vec<u8>, attempts: u32) -> Self {
        Self {
            panel_index,
            status: PanelStatus::Success,
            image_bytes: Some(image_bytes),
            attempts,
            last_error: None,
        }
    }

    pub fn failed(panel_index: PanelIndex, attempts: u32, last_error: String) -> Self {
        Self {
            panel_index,
            status: PanelStatus::Failed,
            image_bytes: None,
            attempts,
            last_error: Some(last_error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PanelStatus::Success
    }
}

/// Per-story record in the published metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub panel: PanelIndex,
    pub title: String,
    pub summary: String,
    pub source_url: String,
}

/// Published metadata for one strip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComicMetadata {
    pub date: String,
    pub image: String,
    pub stories: Vec<StoryRecord>,
}

impl ComicMetadata {
    /// Build metadata for the panels that rendered, in ascending panel order.
    pub fn from_outcomes(
        date: NaiveDate,
        selected: &[SelectedStory],
        outcomes: &[PanelOutcome],
    ) -> Self {
        let date = format_date(date);
        let mut stories: Vec<StoryRecord> = selected
            .iter()
            .filter(|s| {
                outcomes
                    .iter()
                    .any(|o| o.panel_index == s.panel_index && o.is_success())
            })
            .map(|s| StoryRecord {
                panel: s.panel_index,
                title: s.story.title.clone(),
                summary: s.story.summary.clone(),
                source_url: s.story.source_url.clone(),
            })
            .collect();
        stories.sort_by_key(|r| r.panel);

        Self {
            image: image_filename(&date),
            date,
            stories,
        }
    }
}

/// `YYYY-MM-DD`, the form used in file names and metadata
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Human-readable date for the title band, e.g. "January 16, 2026"
pub fn display_date(date: NaiveDate) -> String {
    date.format("%B %d, %Y").to_string()
}

pub fn image_filename(date: &str) -> String {
    format!("{}.png", date)
}

/// Downscaled JPEG published beside the full-resolution strip
pub fn web_image_filename(date: &str) -> String {
    format!("{}.jpg", date)
}
