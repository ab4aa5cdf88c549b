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

//! Pipeline orchestration
//!
//! [`AudiobookProcessor::process_folder`] runs one folder through:
//!
//! 1. Analysis: classify the folder, stop early if there is nothing to do
//! 2. Gathering: probe every file and sum the durations
//! 3. Combine + embed chapters, or convert the single file
//! 4. Finalization: backup → install → remove originals → validate
//!
//! Steps run strictly in order. Intermediate files live in a per-run scratch
//! directory which is removed on every exit path. A failure in any step is
//! reported once as an `Error` status and returned unchanged.

use crate::audio::chapters::{build_chapters, write_chapter_file};
use crate::audio::converter::Transcoder;
use crate::audio::metadata::{merge_tags, AudioFileDescriptor, MetadataExtractor};
use crate::config::ProcessorOptions;
use crate::error::{ProcessorError, Result};
use crate::file::manager::FileManager;
use crate::file::scanner::{FolderAnalysis, FolderAnalyzer, ProcessingAction};
use crate::file::workspace::ScratchDir;
use crate::progress::{ProcessingPhase, ProcessingStatus, ProgressSink, SharedSink};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Name of the intermediate concatenated stream inside the scratch directory
const COMBINED_FILE_NAME: &str = "combined.mp4";

/// Result of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub action: ProcessingAction,
    /// Installed artifact, `None` when the folder needed no processing
    pub artifact: Option<PathBuf>,
    /// Whether the installed artifact passed validation
    pub validated: bool,
}

/// Folder → chaptered M4B pipeline
#[derive(Debug, Clone)]
pub struct AudiobookProcessor {
    options: ProcessorOptions,
    analyzer: FolderAnalyzer,
    extractor: MetadataExtractor,
    transcoder: Transcoder,
    files: FileManager,
}

impl AudiobookProcessor {
    pub fn new(options: ProcessorOptions) -> Self {
        let transcoder = Transcoder::new(&options);

        Self {
            analyzer: FolderAnalyzer::new(&options.backup_dir_name),
            extractor: MetadataExtractor::new(transcoder.clone()),
            transcoder,
            files: FileManager::new(),
            options,
        }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Classify a folder without touching it
    pub async fn analyze_folder(&self, folder: &Path) -> Result<FolderAnalysis> {
        self.analyzer.analyze(folder).await
    }

    /// Check that a file exists and is non-empty
    pub async fn validate_output(&self, path: &Path) -> bool {
        self.files.validate(path).await
    }

    /// Run the full pipeline for `folder`
    pub async fn process_folder(&self, folder: &Path, sink: SharedSink) -> Result<ProcessOutcome> {
        let mut scratch = match ScratchDir::create(&self.options.scratch_root()).await {
            Ok(scratch) => scratch,
            Err(e) => return Err(self.fail(e, &sink)),
        };

        let result = self.run_pipeline(folder, &scratch, &sink).await;
        let result = result.map_err(|e| self.fail(e, &sink));

        if let Err(e) = scratch.cleanup().await {
            tracing::warn!("Scratch cleanup failed: {}", e);
        }

        result
    }

    fn fail(&self, error: ProcessorError, sink: &SharedSink) -> ProcessorError {
        tracing::error!("Processing failed: {}", error);
        sink.report(ProcessingStatus::error(error.to_string()));
        error
    }

    async fn run_pipeline(
        &self,
        folder: &Path,
        scratch: &ScratchDir,
        sink: &SharedSink,
    ) -> Result<ProcessOutcome> {
        report(sink, ProcessingPhase::Analysis, "Analyzing folder...");
        let analysis = self.analyzer.analyze(folder).await?;

        if !analysis.action.requires_processing() {
            sink.report(ProcessingStatus::completed(analysis.message.clone()));
            return Ok(ProcessOutcome {
                action: analysis.action,
                artifact: None,
                validated: false,
            });
        }

        report(sink, ProcessingPhase::Processing, "Gathering file information...");
        let descriptors = self.describe_all(&analysis.audio_files).await?;
        let total = descriptors
            .iter()
            .fold(Duration::ZERO, |sum, d| sum.saturating_add(d.duration));
        tracing::info!(
            "Total duration of {} files: {:.1}s",
            descriptors.len(),
            total.as_secs_f64()
        );

        let output_name = self.options.output_file_name(folder);
        let artifact = scratch.file(&output_name);

        match analysis.action {
            ProcessingAction::CombineMultipleFiles => {
                self.combine(folder, &descriptors, total, scratch, &artifact, sink)
                    .await?;
            }
            ProcessingAction::ConvertSingleFile => {
                report(sink, ProcessingPhase::Processing, "Converting single file...");
                let input = analysis
                    .audio_files
                    .first()
                    .ok_or_else(|| ProcessorError::internal("No input file to convert"))?;
                self.transcoder.convert(input, &artifact, total, sink).await?;
            }
            other => {
                return Err(ProcessorError::internal(format!(
                    "Unexpected action {:?}",
                    other
                )))
            }
        }

        let destination = folder.join(&output_name);
        let validated = self
            .finalize(folder, &analysis.audio_files, &artifact, &destination, sink)
            .await?;

        sink.report(ProcessingStatus::completed("Processing complete!"));

        Ok(ProcessOutcome {
            action: analysis.action,
            artifact: Some(destination),
            validated,
        })
    }

    async fn describe_all(&self, paths: &[PathBuf]) -> Result<Vec<AudioFileDescriptor>> {
        let mut descriptors = Vec::with_capacity(paths.len());
        for path in paths {
            descriptors.push(self.extractor.describe(path).await?);
        }
        Ok(descriptors)
    }

    async fn combine(
        &self,
        folder: &Path,
        descriptors: &[AudioFileDescriptor],
        total: Duration,
        scratch: &ScratchDir,
        artifact: &Path,
        sink: &SharedSink,
    ) -> Result<()> {
        report(sink, ProcessingPhase::Processing, "Combining audio files...");
        let inputs: Vec<PathBuf> = descriptors.iter().map(|d| d.path.clone()).collect();
        let combined = scratch.file(COMBINED_FILE_NAME);
        self.transcoder
            .combine(&inputs, folder, &combined, total, sink)
            .await?;

        report(sink, ProcessingPhase::Processing, "Embedding chapters and metadata...");
        let chapters = build_chapters(descriptors);
        let tags = merge_tags(descriptors.iter().map(|d| &d.tags));
        let chapter_file = write_chapter_file(scratch.path(), &chapters, total, &tags).await?;

        let embedded = self
            .transcoder
            .embed_chapters(&combined, &chapter_file, artifact)
            .await;

        if let Err(e) = fs::remove_file(&chapter_file).await {
            tracing::warn!(
                "Failed to remove chapter file {}: {}",
                chapter_file.display(),
                e
            );
        }

        embedded
    }

    /// Backup, install, remove originals and validate; returns validation result
    async fn finalize(
        &self,
        folder: &Path,
        originals: &[PathBuf],
        artifact: &Path,
        destination: &Path,
        sink: &SharedSink,
    ) -> Result<bool> {
        report(sink, ProcessingPhase::Finalization, "Finalizing and cleaning up...");

        let backup_dir = self.options.backup_dir(folder);
        self.files.backup(folder, &backup_dir).await?;
        self.files.install(artifact, destination).await?;

        report(sink, ProcessingPhase::Finalization, "Cleaning up original files...");
        // An input may share the artifact's name; it was replaced by the install
        let originals: Vec<PathBuf> = originals
            .iter()
            .filter(|p| p.as_path() != destination)
            .cloned()
            .collect();
        self.files.remove_originals(&originals).await?;

        let validated = self.files.validate(destination).await;
        if !validated {
            tracing::warn!("Output validation failed for {}", destination.display());
            report(
                sink,
                ProcessingPhase::Finalization,
                format!(
                    "Warning: output file {} is missing or empty.",
                    destination.display()
                ),
            );
        }

        Ok(validated)
    }
}

fn report<S: Into<String>>(sink: &SharedSink, phase: ProcessingPhase, message: S) {
    let status = ProcessingStatus::message(phase, message);
    if let Some(message) = &status.message {
        tracing::debug!("{}", message);
    }
    sink.report(status);
}
