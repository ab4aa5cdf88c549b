//! Error types for the audiobook processor
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Errors are grouped by the pipeline stage that raises them so front ends can
//! decide how to present a failed run.
//!
//! ## Error Categories
//!
//! ### Metadata (from the prober)
//! - Empty or unparsable ffprobe output → `MetadataError`
//!
//! ### Transcoding (from ffmpeg / ffprobe subprocesses)
//! - Nonzero exit → `TranscodeError` (exit code plus captured diagnostic tail)
//! - Executable missing → `ToolNotFound`
//!
//! ### File Operations (backup, install, delete)
//! - Filesystem failures → `FileIoError`, `FileNotFound`, `InvalidPath`
//!
//! ### Validation
//! - Output file missing or empty when checked on request → `ValidationError`

use thiserror::Error;

/// Result type alias using our ProcessorError type
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Main error type for the processing pipeline
///
/// Every pipeline failure is reported exactly once by the orchestrator as an
/// `Error` status and then returned to the caller unchanged.
#[derive(Error, Debug)]
pub enum ProcessorError {
    // ===== Metadata Errors =====

    /// Prober returned empty or unparsable output for a file
    #[error("Metadata error: {0}")]
    MetadataError(String),

    // ===== Transcoder Errors =====

    /// External tool exited with a nonzero status
    #[error("{tool} failed with exit code {}: {diagnostics}", format_exit_code(.exit_code))]
    TranscodeError {
        /// Tool name (e.g. "ffmpeg")
        tool: String,
        /// Exit code, `None` when the process was terminated by a signal
        exit_code: Option<i32>,
        /// Tail of the captured diagnostic stream
        diagnostics: String,
    },

    /// External tool executable could not be spawned
    #[error("{0} not found. Please install FFmpeg and ensure it's in your PATH.")]
    ToolNotFound(String),

    // ===== File/Storage Errors =====

    /// File or directory not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Backup, install or delete failed at the filesystem boundary
    #[error("File I/O error: {0}")]
    FileIoError(String),

    /// Path is not usable for the requested operation
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== Validation Errors =====

    /// Installed artifact failed the existence/size check
    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ===== General Errors =====

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

impl ProcessorError {
    /// Create a MetadataError with a message
    pub fn metadata<S: Into<String>>(message: S) -> Self {
        ProcessorError::MetadataError(message.into())
    }

    /// Create a FileIoError with a message
    pub fn file_io<S: Into<String>>(message: S) -> Self {
        ProcessorError::FileIoError(message.into())
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        ProcessorError::InternalError(message.into())
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            ProcessorError::ToolNotFound(tool) => {
                format!(
                    "{} is required but was not found. Install FFmpeg or point --{} at the executable.",
                    tool, tool
                )
            }
            ProcessorError::TranscodeError {
                tool,
                exit_code,
                diagnostics,
            } => {
                let last_line = diagnostics
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .unwrap_or("no diagnostic output");
                format!(
                    "{} failed (exit code {}): {}",
                    tool,
                    format_exit_code(exit_code),
                    last_line
                )
            }
            _ => self.to_string(),
        }
    }
}
