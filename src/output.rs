//! Output Manager
//!
//! Publishes a composed strip: dated artifacts, the rolling `latest` view and the
//! archive index. Rotation state lives only on disk and is re-read on every publish.
//! Each write is atomic on its own (write to .tmp, then rename); a failed write aborts
//! the publish without rolling back earlier writes. `latest.json` is always the last
//! file of the `latest` view to change, so it never points past what `latest-1` shows.

use crate::error::PipelineError;
use crate::types::{format_date, image_filename, web_image_filename, ComicMetadata};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LATEST_JSON: &str = "latest.json";
pub const LATEST_1: &str = "latest-1.png";
pub const LATEST_2: &str = "latest-2.png";
pub const ARCHIVE_JSON: &str = "archive.json";

/// How a publish moves the `latest` view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// New newest date: previous `latest-1` shifts to `latest-2`
    Advance,
    /// Same date as the current latest: replaced in place, `latest-2` untouched
    RefreshInPlace,
    /// Older date: `latest` view untouched
    Backfill,
}

impl Rotation {
    pub fn decide(current: Option<NaiveDate>, date: NaiveDate) -> Self {
        match current {
            None => Rotation::Advance,
            Some(current) if date > current => Rotation::Advance,
            Some(current) if date == current => Rotation::RefreshInPlace,
            Some(_) => Rotation::Backfill,
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rotation::Advance => write!(f, "advance"),
            Rotation::RefreshInPlace => write!(f, "refresh-in-place"),
            Rotation::Backfill => write!(f, "backfill"),
        }
    }
}

/// Files touched by a publish, in write order
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub rotation: Rotation,
    pub written: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    pub comics: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub date: String,
    pub image: String,
}

#[derive(Deserialize)]
struct LatestPointer {
    date: String,
}

pub struct OutputManager {
    dir: PathBuf,
}

impl OutputManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Date of the strip currently shown as `latest-1`, from `latest.json`.
    /// An unreadable or malformed pointer counts as no latest.
    pub fn latest_date(&self) -> Option<NaiveDate> {
        let path = self.dir.join(LATEST_JSON);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read latest pointer");
                return None;
            }
        };
        match serde_json::from_slice::<LatestPointer>(&raw)
            .map_err(|e| e.to_string())
            .and_then(|p| {
                NaiveDate::parse_from_str(&p.date, "%Y-%m-%d").map_err(|e| e.to_string())
            }) {
            Ok(date) => Some(date),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed latest pointer, treating as absent");
                None
            }
        }
    }

    /// Write the strip for `date`. `web_jpeg`, when present, is written next to the PNG
    /// as `{date}.jpg`; metadata and the archive keep pointing at the PNG.
    pub fn publish(
        &self,
        date: NaiveDate,
        png: &[u8],
        web_jpeg: Option<&[u8]>,
        metadata: &ComicMetadata,
    ) -> Result<PublishReport, PipelineError> {
        fs::create_dir_all(&self.dir).map_err(|source| PipelineError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let rotation = Rotation::decide(self.latest_date(), date);
        let date_str = format_date(date);
        let metadata_json = to_json(metadata, &self.dir.join(format!("{}.json", date_str)))?;
        let mut written = Vec::new();

        written.push(self.write(&image_filename(&date_str), png)?);
        if let Some(jpeg) = web_jpeg {
            written.push(self.write(&web_image_filename(&date_str), jpeg)?);
        }
        written.push(self.write(&format!("{}.json", date_str), &metadata_json)?);

        match rotation {
            Rotation::Advance => {
                let previous = self.dir.join(LATEST_1);
                if previous.exists() {
                    let bytes = fs::read(&previous).map_err(|source| PipelineError::Write {
                        path: previous.clone(),
                        source,
                    })?;
                    written.push(self.write(LATEST_2, &bytes)?);
                }
                written.push(self.write(LATEST_1, png)?);
                written.push(self.write(LATEST_JSON, &metadata_json)?);
            }
            Rotation::RefreshInPlace => {
                written.push(self.write(LATEST_1, png)?);
                written.push(self.write(LATEST_JSON, &metadata_json)?);
            }
            Rotation::Backfill => {
                debug!(date = %date_str, "Older than latest, leaving latest view untouched");
            }
        }

        written.push(self.update_archive(&date_str)?);

        info!(date = %date_str, %rotation, files = written.len(), "Published strip");
        Ok(PublishReport { rotation, written })
    }

    pub fn read_archive(&self) -> Archive {
        let path = self.dir.join(ARCHIVE_JSON);
        match fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Malformed archive, starting fresh");
                Archive::default()
            }),
            Err(_) => Archive::default(),
        }
    }

    fn update_archive(&self, date_str: &str) -> Result<PathBuf, PipelineError> {
        let mut archive = self.read_archive();
        if !archive.comics.iter().any(|c| c.date == date_str) {
            archive.comics.push(ArchiveEntry {
                date: date_str.to_string(),
                image: image_filename(date_str),
            });
        }
        archive.comics.sort_by(|a, b| b.date.cmp(&a.date));

        let json = to_json(&archive, &self.dir.join(ARCHIVE_JSON))?;
        self.write(ARCHIVE_JSON, &json)
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PipelineError> {
        let path = self.dir.join(name);
        write_atomic(&path, bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
        Ok(path)
    }
}

fn to_json<T: Serialize>(value: &T, path: &Path) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec_pretty(value).map_err(|e| PipelineError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

/// Write to `<path>.tmp`, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, bytes).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    fs::rename(&temp_path, path).map_err(|source| {
        let _ = fs::remove_file(&temp_path);
        PipelineError::Write {
            path: path.to_path_buf(),
            source,
        }
    })
}
