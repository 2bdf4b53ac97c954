//! Reference Matcher
//!
//! Resolves person names mentioned in stories to likeness records loaded from a
//! static manifest. The table is built once per run and never mutated; matching is a
//! pure function over `(name, table)`.

use crate::error::ApiError;
use crate::types::{ReferenceEntry, Story};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Leading titles stripped before matching. Multi-word titles come first so they win
/// over their single-word prefixes.
const HONORIFICS: &[&str] = &[
    "vice president",
    "prime minister",
    "supreme leader",
    "president",
    "senator",
    "sen",
    "representative",
    "rep",
    "governor",
    "gov",
    "secretary",
    "chancellor",
    "speaker",
    "mayor",
    "judge",
    "justice",
    "general",
    "gen",
    "pope",
    "king",
    "queen",
    "prince",
    "princess",
    "former",
    "mr",
    "mrs",
    "ms",
    "dr",
    "sir",
    "dame",
];

/// Read-only lookup table of reference entries, in manifest order
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Manifest {
    List(Vec<ReferenceEntry>),
    Wrapped { people: Vec<ReferenceEntry> },
}

impl ReferenceTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<ReferenceEntry>) -> Self {
        Self { entries }
    }

    /// Load a JSON manifest. Relative `file` paths resolve against the manifest's
    /// directory.
    pub fn load(manifest_path: &Path) -> Result<Self, ApiError> {
        let raw = std::fs::read_to_string(manifest_path).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to read reference manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| {
            ApiError::ConfigError(format!(
                "Failed to parse reference manifest {}: {}",
                manifest_path.display(),
                e
            ))
        })?;
        let mut entries = match manifest {
            Manifest::List(entries) => entries,
            Manifest::Wrapped { people } => people,
        };

        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));
        for entry in &mut entries {
            if let Some(file) = entry.file.take() {
                entry.file = Some(if file.is_relative() {
                    base.join(file)
                } else {
                    file
                });
            }
        }

        debug!(
            manifest = %manifest_path.display(),
            entries = entries.len(),
            "Loaded reference manifest"
        );
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Normalize a person name for comparison: fold diacritics, lowercase, drop
/// punctuation and leading honorifics, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words: Vec<&str> = folded.split_whitespace().collect();

    loop {
        let stripped = HONORIFICS.iter().find_map(|title| {
            let title_words: Vec<&str> = title.split(' ').collect();
            (words.len() > title_words.len() && words[..title_words.len()] == title_words[..])
                .then_some(title_words.len())
        });
        match stripped {
            Some(n) => {
                words.drain(..n);
            }
            None => break,
        }
    }

    words.join(" ")
}

fn entry_names(entry: &ReferenceEntry) -> impl Iterator<Item = String> + '_ {
    std::iter::once(entry.canonical_name.as_str())
        .chain(entry.aliases.iter().map(String::as_str))
        .map(normalize_name)
        .filter(|n| !n.is_empty())
}

/// Resolve a name to the first matching entry: exact match on canonical name or alias
/// first, then substring containment in either direction.
pub fn match_reference<'a>(name: &str, table: &'a ReferenceTable) -> Option<&'a ReferenceEntry> {
    let needle = normalize_name(name);
    if needle.is_empty() {
        return None;
    }

    if let Some(entry) = table
        .entries
        .iter()
        .find(|entry| entry_names(entry).any(|n| n == needle))
    {
        return Some(entry);
    }

    table.entries.iter().find(|entry| {
        entry_names(entry).any(|n| n.contains(needle.as_str()) || needle.contains(n.as_str()))
    })
}

fn capitalized_run() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\p{Lu}[\p{L}'\.\-]*(?:\s+\p{Lu}[\p{L}'\.\-]*)+").expect("valid name pattern")
    })
}

/// Candidate person names in a story: runs of two or more capitalized words, plus any
/// known name or alias that appears verbatim.
pub fn candidate_names(story: &Story, table: &ReferenceTable) -> Vec<String> {
    let text = format!("{}\n{}", story.title, story.summary);
    let mut candidates: Vec<String> = capitalized_run()
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect();

    let normalized_text = format!(" {} ", normalize_name(&text));
    for entry in &table.entries {
        for name in entry_names(entry) {
            if normalized_text.contains(&format!(" {} ", name)) {
                candidates.push(name);
            }
        }
    }
    candidates
}

/// Reference entries for every person mentioned in a story, in first-mention order
/// without duplicates.
pub fn mentioned_people<'a>(story: &Story, table: &'a ReferenceTable) -> Vec<&'a ReferenceEntry> {
    if table.is_empty() {
        return Vec::new();
    }
    let mut found: Vec<&ReferenceEntry> = Vec::new();
    for candidate in candidate_names(story, table) {
        if let Some(entry) = match_reference(&candidate, table) {
            if !found.iter().any(|e| std::ptr::eq(*e, entry)) {
                found.push(entry);
            }
        }
    }
    found
}
