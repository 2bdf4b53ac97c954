//! Story Selector
//!
//! Picks the six stories that become the day's panels with one call to the reasoning
//! backend. The reply is validated strictly: exactly six distinct stories or nothing.

use crate::config::StripConfig;
use crate::error::SelectionError;
use crate::provider::{ChatMessage, CompletionOptions, ReasoningClient};
use crate::types::{PanelIndex, SelectedStory, Story, PANEL_COUNT};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What the selector tells the backend about the strip
#[derive(Debug, Clone)]
pub struct SelectionCriteria {
    pub title: String,
    pub temperature: Option<f32>,
}

impl SelectionCriteria {
    pub fn from_config(config: &StripConfig) -> Self {
        Self {
            title: config.style.title.clone(),
            temperature: config.reasoning.temperature,
        }
    }
}

pub struct StorySelector {
    client: Arc<dyn ReasoningClient>,
    criteria: SelectionCriteria,
}

impl StorySelector {
    pub fn new(client: Arc<dyn ReasoningClient>, criteria: SelectionCriteria) -> Self {
        Self { client, criteria }
    }

    /// Select exactly six stories, assigning panels in the order the backend ranked them.
    pub async fn select(&self, stories: &[Story]) -> Result<Vec<SelectedStory>, SelectionError> {
        if stories.len() < PANEL_COUNT {
            return Err(SelectionError::NotEnoughStories {
                required: PANEL_COUNT,
                available: stories.len(),
            });
        }

        info!(
            candidates = stories.len(),
            provider = self.client.provider_name(),
            model = self.client.model_name(),
            "Selecting stories"
        );

        let messages = vec![
            ChatMessage::system(
                "You are the editor of a daily illustrated news strip. Reply with JSON only.",
            ),
            ChatMessage::user(build_selection_request(&self.criteria.title, stories)),
        ];
        let options = CompletionOptions {
            temperature: self.criteria.temperature,
            max_tokens: None,
        };

        let response = self.client.complete(messages, options).await?;
        debug!(reply = %response.content, "Selection reply");

        let selected = parse_selection(&response.content, stories)?;
        for s in &selected {
            info!(panel = %s.panel_index, title = %s.story.title, "Selected story");
        }
        Ok(selected)
    }
}

/// The request text: selection criteria plus every story, numbered from 1.
pub fn build_selection_request(title: &str, stories: &[Story]) -> String {
    let listing = stories
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {}\n{}\n{}", i + 1, s.title, s.summary, s.source_url))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are selecting stories for a daily comic strip called \"{title}\".\n\n\
         From these {count} stories, select exactly {panels} that will make the best comic panels. \
         Consider, in priority order:\n\
         1. Visual potential - can this translate to a compelling image? Concrete events over abstract policy debates\n\
         2. Topic diversity - mix politics, culture, science, international, human interest\n\
         3. Significance - major breaking news takes priority\n\
         4. Tonal variety - balance serious with lighter stories\n\n\
         STORIES:\n{listing}\n\n\
         Return ONLY a JSON array of {panels} objects in the order they should appear in the comic, \
         each of the form {{\"story\": <number>, \"rationale\": \"<one sentence>\"}}.",
        title = title,
        count = stories.len(),
        panels = PANEL_COUNT,
        listing = listing,
    )
}

/// Validate a selection reply against the input stories.
pub fn parse_selection(
    response: &str,
    stories: &[Story],
) -> Result<Vec<SelectedStory>, SelectionError> {
    let elements = extract_array(response)
        .ok_or_else(|| SelectionError::Malformed("reply contains no JSON array".to_string()))?;

    if elements.len() != PANEL_COUNT {
        return Err(SelectionError::Malformed(format!(
            "expected {} stories, got {}",
            PANEL_COUNT,
            elements.len()
        )));
    }

    let mut seen = HashSet::new();
    let mut selected = Vec::with_capacity(PANEL_COUNT);
    for (slot, element) in elements.iter().enumerate() {
        let (index, rationale) = resolve_element(element, stories)?;
        if !seen.insert(index) {
            return Err(SelectionError::Malformed(format!(
                "story {} selected more than once",
                index + 1
            )));
        }
        let panel_index = PanelIndex::from_slot(slot)
            .ok_or_else(|| SelectionError::Malformed(format!("no panel for slot {}", slot)))?;
        selected.push(SelectedStory {
            story: stories[index].clone(),
            panel_index,
            rationale,
        });
    }
    Ok(selected)
}

/// First well-formed JSON array in the text, skipping prose and code fences.
fn extract_array(text: &str) -> Option<Vec<Value>> {
    text.match_indices('[').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Array(items))) => Some(items),
            _ => None,
        }
    })
}

/// Map one reply element to a zero-based story index and its rationale.
fn resolve_element(element: &Value, stories: &[Story]) -> Result<(usize, String), SelectionError> {
    let by_number = |n: u64| -> Option<usize> {
        usize::try_from(n)
            .ok()
            .filter(|n| (1..=stories.len()).contains(n))
            .map(|n| n - 1)
    };

    match element {
        Value::Number(n) => n
            .as_u64()
            .and_then(by_number)
            .map(|i| (i, String::new()))
            .ok_or_else(|| SelectionError::Malformed(format!("unknown story number {}", n))),
        Value::Object(map) => {
            let rationale = ["rationale", "reason"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .unwrap_or_default()
                .trim()
                .to_string();

            let number = map.get("story").and_then(|v| match v {
                Value::Number(n) => n.as_u64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
            let index = number
                .and_then(by_number)
                .or_else(|| {
                    ["link", "url", "source_url"]
                        .iter()
                        .find_map(|k| map.get(*k).and_then(Value::as_str))
                        .and_then(|link| {
                            stories.iter().position(|s| s.source_url == link.trim())
                        })
                })
                .or_else(|| {
                    map.get("title")
                        .and_then(Value::as_str)
                        .and_then(|title| stories.iter().position(|s| s.title == title))
                })
                .ok_or_else(|| {
                    SelectionError::Malformed(format!("element does not match any story: {}", element))
                })?;
            Ok((index, rationale))
        }
        other => Err(SelectionError::Malformed(format!(
            "unexpected element in selection: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;
    use proptest::prelude::*;

    fn stories(n: usize) -> Vec<Story> {
        (1..=n)
            .map(|i| Story {
                title: format!("Story {}", i),
                summary: format!("Summary {}", i),
                source_url: format!("https://example.com/{}", i),
                published_at: None,
                author: None,
            })
            .collect()
    }

    fn criteria() -> SelectionCriteria {
        SelectionCriteria {
            title: "AI THINGS CONSIDERED".to_string(),
            temperature: None,
        }
    }

    #[test]
    fn parses_objects_inside_prose_and_fences() {
        let reply = "Here you go:\n```json\n[{\"story\": 3, \"rationale\": \"vivid\"}, {\"story\": \"7\"}, 1, {\"link\": \"https://example.com/12\"}, {\"title\": \"Story 5\", \"reason\": \"light\"}, 9]\n```";
        let selected = parse_selection(reply, &stories(12)).unwrap();

        let titles: Vec<&str> = selected.iter().map(|s| s.story.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Story 3", "Story 7", "Story 1", "Story 12", "Story 5", "Story 9"]
        );
        let panels: Vec<u8> = selected.iter().map(|s| s.panel_index.get()).collect();
        assert_eq!(panels, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(selected[0].rationale, "vivid");
        assert_eq!(selected[4].rationale, "light");
    }

    #[test]
    fn skips_bracketed_prose_before_the_array() {
        let reply = "Picks [see below]: [1, 2, 3, 4, 5, 6]";
        assert_eq!(parse_selection(reply, &stories(8)).unwrap().len(), 6);
    }

    #[test]
    fn rejects_wrong_count_duplicates_and_unknowns() {
        let pool = stories(10);
        for reply in [
            "[1, 2, 3, 4, 5]",
            "[1, 2, 3, 4, 5, 6, 7]",
            "[1, 2, 3, 4, 5, 5]",
            "[1, 2, 3, 4, 5, 11]",
            "[0, 1, 2, 3, 4, 5]",
            "[{\"title\": \"Nope\"}, 1, 2, 3, 4, 5]",
            "no array here",
            "[1, 2, 3,",
        ] {
            assert!(
                matches!(parse_selection(reply, &pool), Err(SelectionError::Malformed(_))),
                "reply accepted: {}",
                reply
            );
        }
    }

    #[tokio::test]
    async fn too_few_stories_never_calls_backend() {
        let client = Arc::new(MockProvider::new(vec![]));
        let selector = StorySelector::new(client.clone(), criteria());

        let err = selector.select(&stories(5)).await.unwrap_err();

        assert!(matches!(
            err,
            SelectionError::NotEnoughStories {
                required: 6,
                available: 5
            }
        ));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn select_sends_numbered_stories_with_title() {
        let client = Arc::new(MockProvider::new(vec!["[6, 5, 4, 3, 2, 1]".to_string()]));
        let selector = StorySelector::new(client.clone(), criteria());

        let selected = selector.select(&stories(20)).await.unwrap();

        assert_eq!(selected[0].story.title, "Story 6");
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0][1].content;
        assert!(prompt.contains("\"AI THINGS CONSIDERED\""));
        assert!(prompt.contains("[20] Story 20"));
    }

    #[tokio::test]
    async fn backend_failure_is_not_retried() {
        let client = Arc::new(MockProvider::with_results(vec![
            Err("503".to_string()),
            Ok("[1, 2, 3, 4, 5, 6]".to_string()),
        ]));
        let selector = StorySelector::new(client.clone(), criteria());

        let err = selector.select(&stories(8)).await.unwrap_err();

        assert!(matches!(err, SelectionError::Backend(_)));
        assert_eq!(client.requests().len(), 1);
    }

    proptest! {
        #[test]
        fn any_six_distinct_picks_cover_every_panel(
            (n, picks) in (6usize..30).prop_flat_map(|n| {
                (Just(n), Just((1..=n).collect::<Vec<_>>()).prop_shuffle())
            })
        ) {
            let pool = stories(n);
            let reply = serde_json::to_string(&picks[..6]).unwrap();
            let selected = parse_selection(&reply, &pool).unwrap();

            let panels: Vec<u8> = selected.iter().map(|s| s.panel_index.get()).collect();
            prop_assert_eq!(panels, vec![1, 2, 3, 4, 5, 6]);
            let distinct: HashSet<&str> = selected.iter().map(|s| s.story.source_url.as_str()).collect();
            prop_assert_eq!(distinct.len(), 6);
        }
    }
}
