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

//! File operations for the finalization phase
//!
//! # Key Operations
//! - Recursive backup of the source folder (overwriting earlier backups)
//! - Artifact install (rename, with a staged copy fallback across filesystems)
//! - Removal of the original audio files
//! - Artifact validation
//! - Scratch directory cleanup
//!
//! Single-file operations retry a few times before giving up, since files
//! that were just written by a subprocess or are open in a media player can
//! be briefly locked on some platforms.

use crate::error::{ProcessorError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::fs;
use tokio::time::sleep;
use uuid::Uuid;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// File manager for the finalization phase
#[derive(Debug, Clone, Default)]
pub struct FileManager;

impl FileManager {
    pub fn new() -> Self {
        Self
    }

    /// Copy `source` recursively into `backup`
    ///
    /// Relative paths are preserved and existing copies are overwritten. When
    /// `backup` lies inside `source` it is skipped. Returns the number of files
    /// copied.
    pub async fn backup(&self, source: &Path, backup: &Path) -> Result<usize> {
        self.ensure_directory_exists(backup).await?;

        let mut copied = 0;
        self.backup_recursive(source, source, backup, &mut copied)
            .await?;

        tracing::info!(
            "Backed up {} files from {} to {}",
            copied,
            source.display(),
            backup.display()
        );
        Ok(copied)
    }

    fn backup_recursive<'a>(
        &'a self,
        root: &'a Path,
        dir: &'a Path,
        backup: &'a Path,
        copied: &'a mut usize,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
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
                if path == backup {
                    continue;
                }

                let relative = path.strip_prefix(root).map_err(|_| {
                    ProcessorError::internal(format!(
                        "{} is not under {}",
                        path.display(),
                        root.display()
                    ))
                })?;
                let target = backup.join(relative);

                if entry.file_type().await?.is_dir() {
                    self.backup_recursive(root, &path, backup, copied).await?;
                } else {
                    self.safe_copy(&path, &target).await?;
                    *copied += 1;
                }
            }

            Ok(())
        })
    }

    /// Move `artifact` to `destination`, replacing any existing file
    pub async fn install(&self, artifact: &Path, destination: &Path) -> Result<()> {
        if !Self::file_exists(artifact).await {
            return Err(ProcessorError::FileNotFound(artifact.display().to_string()));
        }

        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.try_install(artifact, destination).await {
                Ok(()) => {
                    tracing::info!("Installed {}", destination.display());
                    return Ok(());
                }
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(ProcessorError::file_io(format!(
                        "Failed to install file after {} attempts: {} -> {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        artifact.display(),
                        destination.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    /// Try to install once
    ///
    /// The destination is only ever replaced by a rename, so it holds either
    /// the previous file or the complete artifact.
    async fn try_install(&self, artifact: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            self.ensure_directory_exists(parent).await?;
        }

        // Rename is atomic on the same filesystem; scratch usually lives elsewhere
        if let Err(e) = fs::rename(artifact, destination).await {
            tracing::debug!(
                "Rename failed ({}), copying {} instead",
                e,
                artifact.display()
            );

            Self::copy_into_place(artifact, destination).await?;
            Self::safe_delete_once(artifact).await?;
        }

        Ok(())
    }

    /// Copy to a temp file next to `destination`, sync it, then rename it over
    async fn copy_into_place(source: &Path, destination: &Path) -> Result<()> {
        let file_name = destination
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact");
        let temp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple());
        let temp_path = match destination.parent() {
            Some(parent) => parent.join(temp_name),
            None => PathBuf::from(temp_name),
        };

        let staged = async {
            fs::copy(source, &temp_path).await?;
            fs::OpenOptions::new()
                .write(true)
                .open(&temp_path)
                .await?
                .sync_all()
                .await?;
            fs::rename(&temp_path, destination).await
        }
        .await;

        if let Err(e) = staged {
            let _ = fs::remove_file(&temp_path).await;
            return Err(ProcessorError::file_io(format!(
                "Copy failed: {} -> {}: {}",
                source.display(),
                destination.display(),
                e
            )));
        }

        Ok(())
    }

    /// Delete the original audio files
    ///
    /// Every path is attempted even after a failure. Files that are already
    /// gone count as deleted. Fails with the list of files left behind.
    pub async fn remove_originals(&self, paths: &[PathBuf]) -> Result<()> {
        let mut leftovers = Vec::new();

        for path in paths {
            if let Err(e) = self.safe_delete(path).await {
                tracing::warn!("{}", e);
                leftovers.push(path.display().to_string());
            }
        }

        if leftovers.is_empty() {
            tracing::info!("Removed {} original files", paths.len());
            Ok(())
        } else {
            Err(ProcessorError::file_io(format!(
                "Could not remove {} of {} original files: {}",
                leftovers.len(),
                paths.len(),
                leftovers.join(", ")
            )))
        }
    }

    /// Check that `path` is a non-empty regular file
    pub async fn validate(&self, path: &Path) -> bool {
        match fs::metadata(path).await {
            Ok(metadata) => metadata.is_file() && metadata.len() > 0,
            Err(_) => false,
        }
    }

    /// Remove a scratch directory tree; a missing directory is fine
    pub async fn cleanup_scratch(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessorError::file_io(format!(
                "Failed to remove scratch directory {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Safe copy operation with retry
    async fn safe_copy(&self, source: &Path, destination: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match self.try_copy(source, destination).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(ProcessorError::file_io(format!(
                        "Failed to copy file after {} attempts: {} -> {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        source.display(),
                        destination.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    async fn try_copy(&self, source: &Path, destination: &Path) -> Result<()> {
        if let Some(parent) = destination.parent() {
            self.ensure_directory_exists(parent).await?;
        }

        fs::copy(source, destination).await.map_err(|e| {
            ProcessorError::file_io(format!(
                "Copy failed: {} -> {}: {}",
                source.display(),
                destination.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Safe delete operation with retry
    async fn safe_delete(&self, path: &Path) -> Result<()> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match Self::safe_delete_once(path).await {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                    return Err(ProcessorError::file_io(format!(
                        "Failed to delete file after {} attempts: {}: {}",
                        MAX_RETRY_ATTEMPTS,
                        path.display(),
                        e
                    )));
                }
                Err(_) => {
                    sleep(RETRY_DELAY).await;
                    continue;
                }
            }
        }
    }

    async fn safe_delete_once(path: &Path) -> Result<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProcessorError::file_io(format!(
                "Delete failed: {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Ensure directory exists, creating parent directories as needed
    pub async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(|e| {
            ProcessorError::file_io(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Check if file exists
    pub async fn file_exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}
