// Audiobook Processor - folder to chaptered M4B converter
// Copyright (C) 2026 The Audiobook Processor Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-file metadata extraction
//!
//! Reads container name, duration and the handful of tags the pipeline cares
//! about from the prober's JSON output.
//!
//! # Tag mapping
//! - `title` → title
//! - `artist` → author
//! - `composer` → narrator
//!
//! Keys are matched case-insensitively since some containers (FLAC, Ogg)
//! report them upper-case.

use crate::audio::converter::Transcoder;
use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Album-level tags of one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTags {
    pub title: String,
    pub author: String,
    pub narrator: String,
}

impl AudioTags {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.author.is_empty() && self.narrator.is_empty()
    }
}

/// Everything the pipeline knows about one input file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFileDescriptor {
    pub path: PathBuf,
    /// Container name as reported by the prober (e.g. "mp3", "mov,mp4,m4a,3gp,3g2,mj2")
    pub format_name: String,
    /// Zero when the prober did not report a usable duration
    pub duration: Duration,
    pub size_bytes: u64,
    pub tags: AudioTags,
}

/// FFprobe JSON output structures
#[derive(Debug, Deserialize)]
struct MetadataProbe {
    format: Option<MetadataFormat>,
}

#[derive(Debug, Deserialize)]
struct MetadataFormat {
    format_name: Option<String>,
    /// Usually a string, some builds emit a number
    duration: Option<serde_json::Value>,
    tags: Option<HashMap<String, String>>,
}

/// Parsed probe output, before filesystem facts are added
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSummary {
    pub format_name: String,
    pub duration: Duration,
    pub tags: AudioTags,
}

/// Parse the prober's JSON document
pub fn parse_probe_output(raw: &str) -> Result<ProbeSummary> {
    if raw.trim().is_empty() {
        return Err(ProcessorError::metadata("ffprobe returned no output"));
    }

    let probe: MetadataProbe = serde_json::from_str(raw)
        .map_err(|e| ProcessorError::metadata(format!("Unparsable ffprobe output: {}", e)))?;

    let format = probe
        .format
        .ok_or_else(|| ProcessorError::metadata("ffprobe output has no format section"))?;

    let duration = format
        .duration
        .as_ref()
        .and_then(parse_duration_value)
        .unwrap_or(Duration::ZERO);

    let tags = format.tags.unwrap_or_default();

    Ok(ProbeSummary {
        format_name: format.format_name.unwrap_or_default(),
        duration,
        tags: AudioTags {
            title: tag_value(&tags, "title"),
            author: tag_value(&tags, "artist"),
            narrator: tag_value(&tags, "composer"),
        },
    })
}

fn parse_duration_value(value: &serde_json::Value) -> Option<Duration> {
    let seconds = match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };

    Duration::try_from_secs_f64(seconds).ok()
}

fn tag_value(tags: &HashMap<String, String>, key: &str) -> String {
    tags.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default()
}

/// Merge album tags: first non-empty value per field, in source order
pub fn merge_tags<'a, I>(sources: I) -> AudioTags
where
    I: IntoIterator<Item = &'a AudioTags>,
{
    let mut merged = AudioTags::default();

    for tags in sources {
        if merged.title.is_empty() {
            merged.title = tags.title.clone();
        }
        if merged.author.is_empty() {
            merged.author = tags.author.clone();
        }
        if merged.narrator.is_empty() {
            merged.narrator = tags.narrator.clone();
        }
    }

    merged
}

/// Builds file descriptors from the prober
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    transcoder: Transcoder,
}

impl MetadataExtractor {
    pub fn new(transcoder: Transcoder) -> Self {
        Self { transcoder }
    }

    /// Probe one file and combine the result with its size on disk
    pub async fn describe(&self, path: &Path) -> Result<AudioFileDescriptor> {
        let raw = self.transcoder.probe(path).await?;

        let summary = parse_probe_output(&raw).map_err(|e| match e {
            ProcessorError::MetadataError(msg) => {
                ProcessorError::MetadataError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;

        let size_bytes = fs::metadata(path)
            .await
            .map_err(|e| {
                ProcessorError::file_io(format!(
                    "Failed to read size of {}: {}",
                    path.display(),
                    e
                ))
            })?
            .len();

        if summary.duration.is_zero() {
            tracing::warn!("No usable duration for {}", path.display());
        }

        Ok(AudioFileDescriptor {
            path: path.to_path_buf(),
            format_name: summary.format_name,
            duration: summary.duration,
            size_bytes,
            tags: summary.tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_probe_output() {
        let raw = r#"{
            "streams": [{ "codec_type": "audio", "codec_name": "mp3" }],
            "format": {
                "format_name": "mp3",
                "duration": "1234.567000",
                "tags": { "title": "The Book", "artist": "Jane Author", "composer": "Joe Reader" }
            }
        }"#;

        let summary = parse_probe_output(raw).unwrap();
        assert_eq!(summary.format_name, "mp3");
        assert_eq!(summary.duration, Duration::from_millis(1_234_567));
        assert_eq!(summary.tags.title, "The Book");
        assert_eq!(summary.tags.author, "Jane Author");
        assert_eq!(summary.tags.narrator, "Joe Reader");
    }

    #[test]
    fn test_missing_tags_are_empty() {
        let raw = r#"{ "format": { "format_name": "flac", "duration": "10.0" } }"#;
        let summary = parse_probe_output(raw).unwrap();
        assert!(summary.tags.is_empty());
        assert_eq!(summary.duration, Duration::from_secs(10));
    }

    #[test]
    fn test_tag_keys_match_case_insensitively() {
        let raw = r#"{ "format": { "format_name": "ogg", "tags": { "TITLE": "Loud", "Artist": "Mixed" } } }"#;
        let summary = parse_probe_output(raw).unwrap();
        assert_eq!(summary.tags.title, "Loud");
        assert_eq!(summary.tags.author, "Mixed");
    }

    #[test]
    fn test_bad_duration_is_zero() {
        let raw = r#"{ "format": { "format_name": "mp3", "duration": "N/A" } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration, Duration::ZERO);

        let raw = r#"{ "format": { "format_name": "mp3" } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration, Duration::ZERO);
    }

    #[test]
    fn test_out_of_range_duration_is_zero() {
        let raw = r#"{ "format": { "format_name": "mp3", "duration": "1e20" } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration, Duration::ZERO);

        let raw = r#"{ "format": { "format_name": "mp3", "duration": "-4.0" } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration, Duration::ZERO);
    }

    #[test]
    fn test_numeric_duration_is_accepted() {
        let raw = r#"{ "format": { "duration": 2.5 } }"#;
        assert_eq!(parse_probe_output(raw).unwrap().duration, Duration::from_millis(2500));
    }

    #[test]
    fn test_empty_or_garbage_output_is_metadata_error() {
        assert!(matches!(parse_probe_output(""), Err(ProcessorError::MetadataError(_))));
        assert!(matches!(parse_probe_output("  \n"), Err(ProcessorError::MetadataError(_))));
        assert!(matches!(parse_probe_output("not json"), Err(ProcessorError::MetadataError(_))));
        assert!(matches!(parse_probe_output("{}"), Err(ProcessorError::MetadataError(_))));
    }

    #[test]
    fn test_merge_takes_first_non_empty_per_field() {
        let first = AudioTags {
            title: String::new(),
            author: "Author A".to_string(),
            narrator: String::new(),
        };
        let second = AudioTags {
            title: "Title B".to_string(),
            author: "Author B".to_string(),
            narrator: String::new(),
        };
        let third = AudioTags {
            title: "Title C".to_string(),
            author: String::new(),
            narrator: "Narrator C".to_string(),
        };

        let merged = merge_tags([&first, &second, &third]);
        assert_eq!(merged.title, "Title B");
        assert_eq!(merged.author, "Author A");
        assert_eq!(merged.narrator, "Narrator C");
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        assert!(merge_tags(std::iter::empty::<&AudioTags>()).is_empty());
    }
}
