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

//! Folder analysis and filesystem operations
//!
//! - `scanner` - Classifies a folder by its audio files
//! - `manager` - Backup, install, delete and validate during finalization
//! - `workspace` - Per-run scratch directories

pub mod manager;
pub mod scanner;
pub mod workspace;

// Re-export commonly used types
pub use manager::FileManager;
pub use scanner::{FolderAnalysis, FolderAnalyzer, ProcessingAction};
pub use workspace::ScratchDir;
