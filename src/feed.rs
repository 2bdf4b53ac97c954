//! News feed collaborator: fetches the day's raw stories.

use crate::config::FeedConfig;
use crate::error::ApiError;
use crate::types::Story;
use async_trait::async_trait;
use chrono::DateTime;
use regex::Regex;
use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

/// Source of raw stories for a run
#[async_trait]
pub trait StoryFeed: Send + Sync {
    async fn fetch_stories(&self) -> Result<Vec<Story>, ApiError>;
}

/// RSS 2.0 feed fetched over HTTP
pub struct RssFeed {
    client: Client,
    url: String,
}

impl RssFeed {
    pub fn new(config: &FeedConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("ai-things-considered/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::FeedError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl StoryFeed for RssFeed {
    async fn fetch_stories(&self) -> Result<Vec<Story>, ApiError> {
        debug!(url = %self.url, "Fetching feed");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ApiError::FeedError(format!("Request to {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::FeedError(format!(
                "Feed {} returned status {}",
                self.url, status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::FeedError(format!("Failed to read feed body: {}", e)))?;
        let stories = parse_channel(&bytes)?;
        info!(url = %self.url, stories = stories.len(), "Fetched feed");
        Ok(stories)
    }
}

/// Parse an RSS 2.0 document into stories. Items lacking a title or link are skipped;
/// a feed with no usable items is an error.
pub fn parse_channel(bytes: &[u8]) -> Result<Vec<Story>, ApiError> {
    let channel = rss::Channel::read_from(bytes)
        .map_err(|e| ApiError::FeedError(format!("Failed to parse RSS: {}", e)))?;

    let stories: Vec<Story> = channel
        .items()
        .iter()
        .filter_map(|item| {
            let title = strip_html(item.title()?);
            let link = item.link()?.trim().to_string();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            let author = item
                .author()
                .map(str::to_string)
                .or_else(|| {
                    item.dublin_core_ext()
                        .and_then(|dc| dc.creators().first().cloned())
                })
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());
            Some(Story {
                title,
                summary: item.description().map(strip_html).unwrap_or_default(),
                source_url: link,
                published_at: item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok()),
                author,
            })
        })
        .collect();

    if stories.is_empty() {
        return Err(ApiError::FeedError(
            "Feed contained no usable stories".to_string(),
        ));
    }
    Ok(stories)
}

fn tag_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid tag pattern"))
}

fn entity_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid entity pattern"))
}

/// Remove markup and decode common entities, collapsing whitespace.
pub fn strip_html(input: &str) -> String {
    let without_tags = tag_pattern().replace_all(input, " ");
    let decoded = entity_pattern().replace_all(&without_tags, |caps: &regex::Captures| {
        let entity = &caps[1];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            "mdash" => Some('\u{2014}'),
            "ndash" => Some('\u{2013}'),
            "hellip" => Some('\u{2026}'),
            "rsquo" => Some('\u{2019}'),
            "lsquo" => Some('\u{2018}'),
            "rdquo" => Some('\u{201D}'),
            "ldquo" => Some('\u{201C}'),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
            }
            _ if entity.starts_with('#') => entity[1..].parse().ok().and_then(char::from_u32),
            _ => None,
        };
        decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
    });
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
