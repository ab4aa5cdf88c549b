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

//! Chapter synthesis and ffmetadata rendering
//!
//! One chapter per input file, in input order. Each chapter starts where the
//! previous file ended, so chapter boundaries line up with the concatenated
//! stream the transcoder produces.
//!
//! # ffmetadata layout
//! ```text
//! ;FFMETADATA1
//! title=Book
//! artist=Author
//!
//! [CHAPTER]
//! TIMEBASE=1/1000
//! START=0
//! END=10000
//! title=01 - Opening
//! ```

use crate::audio::metadata::{AudioFileDescriptor, AudioTags};
use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

/// Chapter marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    /// Offset from the start of the combined stream
    pub start: Duration,
}

impl Chapter {
    /// Start time in milliseconds
    pub fn start_ms(&self) -> u128 {
        self.start.as_millis()
    }
}

/// Build one chapter per file, titled after the file stem
pub fn build_chapters(files: &[AudioFileDescriptor]) -> Vec<Chapter> {
    let mut offset = Duration::ZERO;
    let mut chapters = Vec::with_capacity(files.len());

    for file in files {
        let title = file
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        chapters.push(Chapter {
            title,
            start: offset,
        });
        offset = offset.saturating_add(file.duration);
    }

    chapters
}

/// Render chapters and album tags as an ffmetadata document
///
/// Each chapter ends where the next one starts. The last chapter ends at
/// `total`.
pub fn render_ffmetadata(chapters: &[Chapter], total: Duration, tags: &AudioTags) -> String {
    let mut content = String::from(";FFMETADATA1\n");

    for (key, value) in [
        ("title", &tags.title),
        ("artist", &tags.author),
        ("composer", &tags.narrator),
    ] {
        if !value.is_empty() {
            content.push_str(&format!("{}={}\n", key, escape_value(value)));
        }
    }

    for (idx, chapter) in chapters.iter().enumerate() {
        let end_ms = chapters
            .get(idx + 1)
            .map(Chapter::start_ms)
            .unwrap_or_else(|| total.as_millis());

        content.push_str("\n[CHAPTER]\n");
        content.push_str("TIMEBASE=1/1000\n");
        content.push_str(&format!("START={}\n", chapter.start_ms()));
        content.push_str(&format!("END={}\n", end_ms));
        content.push_str(&format!("title={}\n", escape_value(&chapter.title)));
    }

    content
}

/// Write the ffmetadata document to a uniquely named file in `dir`
///
/// The caller owns the returned file and removes it once embedded.
pub async fn write_chapter_file(
    dir: &Path,
    chapters: &[Chapter],
    total: Duration,
    tags: &AudioTags,
) -> Result<PathBuf> {
    let path = dir.join(format!("chapters-{}.txt", Uuid::new_v4()));
    let content = render_ffmetadata(chapters, total, tags);

    fs::write(&path, content).await.map_err(|e| {
        ProcessorError::file_io(format!(
            "Failed to write chapter file {}: {}",
            path.display(),
            e
        ))
    })?;

    tracing::debug!("Wrote {} chapters to {}", chapters.len(), path.display());
    Ok(path)
}

/// Escape special characters for ffmetadata values
fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
