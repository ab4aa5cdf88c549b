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

//! Supported input formats
//!
//! Detection is by file extension only. The prober reports the real
//! container name later, this table just decides which files a folder
//! scan picks up.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Audio format enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    /// MPEG Audio Layer 3
    Mp3,
    /// AAC in an MP4 container
    M4a,
    /// Audiobook MP4 container, also the pipeline's output format
    M4b,
    /// Free Lossless Audio Codec
    Flac,
    /// Ogg Vorbis / Opus
    Ogg,
    /// Windows Media Audio
    Wma,
    /// Unknown or unsupported format
    Unknown,
}

impl AudioFormat {
    /// Detect format from file extension (case-insensitive, no dot)
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "mp3" => Self::Mp3,
            "m4a" => Self::M4a,
            "m4b" => Self::M4b,
            "flac" => Self::Flac,
            "ogg" => Self::Ogg,
            "wma" => Self::Wma,
            _ => Self::Unknown,
        }
    }

    /// Detect format from a path's extension
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        *self != Self::Unknown
    }
}
