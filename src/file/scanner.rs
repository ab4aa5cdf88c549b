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

//! Folder analysis
//!
//! Walks a folder for supported audio files and decides what the pipeline
//! should do with it. Analysis never modifies the folder.

use crate::audio::format::AudioFormat;
use crate::error::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;

/// What the pipeline will do with a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingAction {
    CombineMultipleFiles,
    ConvertSingleFile,
    AlreadyProcessed,
    NoAudioFilesFound,
}

impl ProcessingAction {
    /// Whether the pipeline has work to do
    pub fn requires_processing(&self) -> bool {
        matches!(self, Self::CombineMultipleFiles | Self::ConvertSingleFile)
    }
}

/// Analysis results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderAnalysis {
    /// Supported audio files, sorted lexicographically by path
    pub audio_files: Vec<PathBuf>,
    pub action: ProcessingAction,
    pub message: String,
}

impl FolderAnalysis {
    /// Classify a sorted file list
    pub fn classify(audio_files: Vec<PathBuf>) -> Self {
        let (action, message) = match audio_files.as_slice() {
            [] => (
                ProcessingAction::NoAudioFilesFound,
                "No supported audio files found in this folder.".to_string(),
            ),
            [single] if AudioFormat::from_path(single) == AudioFormat::M4b => (
                ProcessingAction::AlreadyProcessed,
                "Folder appears to be already processed.".to_string(),
            ),
            [_] => (
                ProcessingAction::ConvertSingleFile,
                "Found one audio file to convert to M4B.".to_string(),
            ),
            files => (
                ProcessingAction::CombineMultipleFiles,
                format!(
                    "Found {} audio files to combine into a single M4B.",
                    files.len()
                ),
            ),
        };

        Self {
            audio_files,
            action,
            message,
        }
    }
}

/// Folder scanner
#[derive(Debug, Clone)]
pub struct FolderAnalyzer {
    /// Directory name skipped at every level (the pipeline's backup folder)
    skip_dir: OsString,
}

impl FolderAnalyzer {
    pub fn new(backup_dir_name: &str) -> Self {
        Self {
            skip_dir: OsString::from(backup_dir_name),
        }
    }

    /// Scan `folder` recursively and classify it
    pub async fn analyze(&self, folder: &Path) -> Result<FolderAnalysis> {
        if !fs::try_exists(folder).await.unwrap_or(false) {
            return Err(ProcessorError::InvalidPath(format!(
                "Directory does not exist: {}",
                folder.display()
            )));
        }

        if !fs::metadata(folder).await?.is_dir() {
            return Err(ProcessorError::InvalidPath(format!(
                "Path is not a directory: {}",
                folder.display()
            )));
        }

        let mut audio_files = Vec::new();
        self.scan_recursive(folder, &mut audio_files).await?;
        audio_files.sort();

        let analysis = FolderAnalysis::classify(audio_files);
        tracing::info!(
            "Analyzed {}: {:?} ({} files)",
            folder.display(),
            analysis.action,
            analysis.audio_files.len()
        );

        Ok(analysis)
    }

    /// Recursively scan directory
    fn scan_recursive<'a>(
        &'a self,
        dir: &'a Path,
        found: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = fs::read_dir(dir).await.map_err(|e| {
                ProcessorError::file_io(format!(
                    "Failed to read directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                ProcessorError::file_io(format!(
                    "Failed to read directory entry in {}: {}",
                    dir.display(),
                    e
                ))
            })? {
                let path = entry.path();
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if entry.file_name() == self.skip_dir {
                        continue;
                    }
                    self.scan_recursive(&path, found).await?;
                } else if AudioFormat::from_path(&path).is_supported() {
                    found.push(path);
                }
            }

            Ok(())
        })
    }
}
