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

//! Processor options and external tool discovery
//!
//! Options are plain data with serde support so a front end can load them
//! from a settings file, or build them from command line flags.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable overriding the ffmpeg location
pub const FFMPEG_ENV: &str = "AUDIOBOOK_FFMPEG";

/// Environment variable overriding the ffprobe location
pub const FFPROBE_ENV: &str = "AUDIOBOOK_FFPROBE";

/// Locations of the external transcoder and prober executables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Use explicit executable paths
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Resolve both tools
    ///
    /// Lookup order per tool:
    /// 1. `AUDIOBOOK_FFMPEG` / `AUDIOBOOK_FFPROBE` environment variable
    /// 2. `PATH` search
    /// 3. The bare executable name, left for the OS to resolve at spawn time
    pub fn discover() -> Self {
        Self {
            ffmpeg: resolve_tool("ffmpeg", FFMPEG_ENV),
            ffprobe: resolve_tool("ffprobe", FFPROBE_ENV),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self::discover()
    }
}

fn resolve_tool(name: &str, env_var: &str) -> PathBuf {
    if let Some(value) = env::var_os(env_var) {
        if !value.is_empty() {
            return PathBuf::from(value);
        }
    }

    match which::which(name) {
        Ok(path) => path,
        Err(_) => {
            tracing::debug!("{} not found on PATH, using bare name", name);
            PathBuf::from(name)
        }
    }
}

/// Pipeline options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorOptions {
    /// External tool locations
    pub tools: ToolPaths,

    /// Target audio bitrate passed to the encoder (e.g. "128k")
    pub audio_bitrate: String,

    /// Target audio codec
    pub audio_codec: String,

    /// Name of the backup subfolder created inside the processed folder
    pub backup_dir_name: String,

    /// Extension of the installed artifact, without the dot
    pub output_extension: String,

    /// Parent directory for per-run scratch directories (system temp when unset)
    pub scratch_root: Option<PathBuf>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            tools: ToolPaths::discover(),
            audio_bitrate: "128k".to_string(),
            audio_codec: "aac".to_string(),
            backup_dir_name: ".backup".to_string(),
            output_extension: "m4b".to_string(),
            scratch_root: None,
        }
    }
}

impl ProcessorOptions {
    /// Options with explicit tool paths and defaults for everything else
    pub fn with_tools(tools: ToolPaths) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    /// Directory under which scratch directories are created
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(env::temp_dir)
    }

    /// Backup directory for a processed folder
    pub fn backup_dir(&self, folder: &Path) -> PathBuf {
        folder.join(&self.backup_dir_name)
    }

    /// File name of the artifact for a folder (`<folder-name>.<ext>`)
    pub fn output_file_name(&self, folder: &Path) -> String {
        let stem = folder
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("audiobook");
        format!("{}.{}", stem, self.output_extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ProcessorOptions::with_tools(ToolPaths::new("ffmpeg", "ffprobe"));
        assert_eq!(options.audio_bitrate, "128k");
        assert_eq!(options.audio_codec, "aac");
        assert_eq!(options.backup_dir_name, ".backup");
        assert_eq!(options.scratch_root(), env::temp_dir());
    }

    #[test]
    fn test_output_file_name_uses_folder_name() {
        let options = ProcessorOptions::with_tools(ToolPaths::new("ffmpeg", "ffprobe"));
        assert_eq!(
            options.output_file_name(Path::new("/books/The Hobbit")),
            "The Hobbit.m4b"
        );
        assert_eq!(
            options.backup_dir(Path::new("/books/The Hobbit")),
            PathBuf::from("/books/The Hobbit/.backup")
        );
    }

    #[test]
    fn test_deserialize_partial_options() {
        let json = r#"{
            "tools": { "ffmpeg": "/opt/ff/ffmpeg", "ffprobe": "/opt/ff/ffprobe" },
            "audio_bitrate": "64k"
        }"#;
        let options: ProcessorOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.audio_bitrate, "64k");
        assert_eq!(options.tools.ffmpeg, PathBuf::from("/opt/ff/ffmpeg"));
        assert_eq!(options.output_extension, "m4b");
    }
}
