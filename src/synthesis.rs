//! Prompt Synthesis
//!
//! Turns a selected story into the image prompt for its panel. The merge itself
//! (`build_prompt`) is pure; the scene description either comes from the story text or
//! from the reasoning backend, with the story text as fallback.

use crate::config::SceneSource;
use crate::provider::{ChatMessage, CompletionOptions, ReasoningClient};
use crate::references::{mentioned_people, ReferenceTable};
use crate::types::{ImagePrompt, ReferenceEntry, SelectedStory, Story};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

const SYMBOLIC_PEOPLE: &str = "Depict any people symbolically, as silhouettes, from behind or at a distance, never as recognizable portraits.";
const TEXT_RULE: &str = "Text in the image: one key word or short phrase at most, integrated naturally as a sign or headline, or none at all.";

/// Merge style, scene and resolved references into the panel's prompt.
pub fn build_prompt(
    style: &str,
    story: &SelectedStory,
    scene: &str,
    references: &[&ReferenceEntry],
) -> ImagePrompt {
    let mut text = format!("{}\n\nScene: {}", style.trim(), scene.trim());

    if references.is_empty() {
        text.push_str("\n\n");
        text.push_str(SYMBOLIC_PEOPLE);
    } else {
        let people = references
            .iter()
            .map(|r| format!("{} ({})", r.canonical_name, r.features.trim()))
            .collect::<Vec<_>>()
            .join("; ");
        text.push_str(&format!(
            "\n\nPeople present in the scene, taking part in it rather than posing: {}.",
            people
        ));
    }

    text.push_str("\n\n");
    text.push_str(TEXT_RULE);

    ImagePrompt {
        panel_index: story.panel_index,
        text,
        reference_file: references.iter().find_map(|r| r.file.clone()),
    }
}

/// Scene description from the story's own title and summary.
pub fn derive_scene(story: &Story) -> String {
    let summary = story.summary.trim();
    let mut scene = format!(
        "One clear visual idea capturing the meaning of the news story \"{}\"",
        story.title.trim()
    );
    if !summary.is_empty() {
        scene.push_str(": ");
        scene.push_str(summary);
    }
    if !scene.ends_with('.') {
        scene.push('.');
    }
    scene.push_str(" Favor scenes, objects, symbols and architecture over literal events.");
    scene
}

fn scene_request(story: &Story) -> String {
    format!(
        "You are a visual translator. Given a news story, describe one comic panel that captures its essence.\n\n\
         STORY:\nTitle: {}\nDescription: {}\n\n\
         RULES:\n\
         - Capture the feeling and meaning, not literal events\n\
         - One clear visual idea\n\
         - Use symbolic imagery over literal portraits\n\
         - Focus on scenes, objects, silhouettes, symbols, architecture\n\
         - Vary composition: bird's eye, worm's eye, medium shot, wide shot\n\n\
         Return ONLY a one-paragraph scene description, no style notes and no explanation.",
        story.title, story.summary
    )
}

pub struct PromptSynthesizer {
    style: String,
    scene_source: SceneSource,
    client: Option<Arc<dyn ReasoningClient>>,
}

impl PromptSynthesizer {
    /// Synthesizer whose scenes come from the story text only
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            scene_source: SceneSource::Derived,
            client: None,
        }
    }

    /// Synthesizer that asks the reasoning backend for scenes
    pub fn with_reasoning(style: impl Into<String>, client: Arc<dyn ReasoningClient>) -> Self {
        Self {
            style: style.into(),
            scene_source: SceneSource::Reasoning,
            client: Some(client),
        }
    }

    pub async fn synthesize(&self, story: &SelectedStory, table: &ReferenceTable) -> ImagePrompt {
        let references = mentioned_people(&story.story, table);
        let scene = self.scene_for(story).await;
        let prompt = build_prompt(&self.style, story, &scene, &references);
        debug!(
            panel = %story.panel_index,
            references = references.len(),
            reference_file = ?prompt.reference_file,
            "Synthesized prompt"
        );
        prompt
    }

    /// Synthesize every panel concurrently; output follows panel order.
    pub async fn synthesize_all(
        &self,
        stories: &[SelectedStory],
        table: &ReferenceTable,
    ) -> Vec<ImagePrompt> {
        let mut prompts = join_all(stories.iter().map(|s| self.synthesize(s, table))).await;
        prompts.sort_by_key(|p| p.panel_index);
        prompts
    }

    async fn scene_for(&self, story: &SelectedStory) -> String {
        let client = match (self.scene_source, &self.client) {
            (SceneSource::Reasoning, Some(client)) => client,
            _ => return derive_scene(&story.story),
        };

        let messages = vec![ChatMessage::user(scene_request(&story.story))];
        match client.complete(messages, CompletionOptions::default()).await {
            Ok(response) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(_) => {
                warn!(panel = %story.panel_index, "Empty scene from reasoning backend, deriving from story");
                derive_scene(&story.story)
            }
            Err(e) => {
                warn!(panel = %story.panel_index, error = %e, "Scene request failed, deriving from story");
                derive_scene(&story.story)
            }
        }
    }
}
