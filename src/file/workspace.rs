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

//! Per-run scratch directories

use crate::error::{ProcessorError, Result};
use crate::file::manager::FileManager;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Uniquely named directory holding a run's intermediate files
///
/// Not removed on drop. The pipeline calls [`ScratchDir::cleanup`] on every
/// exit path so that cleanup errors can be logged.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create `<root>/audiobook-processor-<uuid>`
    pub async fn create(root: &Path) -> Result<Self> {
        let path = root.join(format!("audiobook-processor-{}", Uuid::new_v4()));

        fs::create_dir_all(&path).await.map_err(|e| {
            ProcessorError::file_io(format!(
                "Failed to create scratch directory {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!("Created scratch directory {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the scratch directory
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory tree; safe to call more than once
    pub async fn cleanup(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }

        FileManager::new().cleanup_scratch(&self.path).await?;
        self.removed = true;
        tracing::debug!("Removed scratch directory {}", self.path.display());
        Ok(())
    }
}
