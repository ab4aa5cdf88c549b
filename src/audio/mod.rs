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

//! Audio inspection, chapter synthesis and transcoding
//!
//! # Module Organization
//!
//! ## format
//! - `AudioFormat` - Supported input formats (MP3, M4A, M4B, FLAC, OGG, WMA)
//!
//! ## metadata
//! - `MetadataExtractor` - Builds `AudioFileDescriptor`s from ffprobe output
//! - `AudioTags` - Title / author / narrator, plus album-level merging
//!
//! ## chapters
//! - `Chapter` - One chapter per input file
//! - ffmetadata rendering for the embed step
//!
//! ## converter
//! - `Transcoder` - ffmpeg/ffprobe subprocess supervision with progress
//! - `ConcatManifest` - Input list for the concat demuxer
//!
//! # FFmpeg Integration
//!
//! This module requires FFmpeg and FFprobe. Locations come from
//! [`crate::config::ToolPaths`]:
//! - FFmpeg: concatenation, AAC encoding, chapter embedding
//! - FFprobe: duration and tag extraction
//!
//! ## Installation
//! - macOS: `brew install ffmpeg`
//! - Linux: `apt-get install ffmpeg` or `yum install ffmpeg`
//! - Windows: Download from https://ffmpeg.org/download.html

pub mod chapters;
pub mod converter;
pub mod format;
pub mod metadata;

// Re-export commonly used types for convenience
pub use chapters::{build_chapters, render_ffmetadata, write_chapter_file, Chapter};
pub use converter::{parse_progress_time, ConcatManifest, Transcoder};
pub use format::AudioFormat;
pub use metadata::{merge_tags, AudioFileDescriptor, AudioTags, MetadataExtractor};
