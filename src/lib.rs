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

//! Audiobook folder processing
//!
//! Turns a folder of separate audio files into one chaptered `.m4b`, using
//! ffmpeg and ffprobe for all encoding and probing work.
//!
//! ```no_run
//! use audiobook_core::{AudiobookProcessor, ProcessorOptions, ProcessingStatus};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> audiobook_core::Result<()> {
//! let processor = AudiobookProcessor::new(ProcessorOptions::default());
//! let sink = Arc::new(|status: ProcessingStatus| println!("{:?}", status));
//! let outcome = processor.process_folder(Path::new("/books/Dune"), sink).await?;
//! println!("installed {:?}", outcome.artifact);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod file;
pub mod processor;
pub mod progress;

#[cfg(all(test, unix))]
mod test_support;

pub use config::{ProcessorOptions, ToolPaths};
pub use error::{ProcessorError, Result};
pub use file::{FolderAnalysis, ProcessingAction};
pub use processor::{AudiobookProcessor, ProcessOutcome};
pub use progress::{ProcessingPhase, ProcessingStatus, ProgressSink, SharedSink};
