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

//! Processing status model and progress estimation
//!
//! # Status Information
//! - Phase of the pipeline (Analysis, Processing, Finalization, ...)
//! - Optional human-readable message
//! - Percentage complete (0.0 - 100.0)
//! - Estimated time remaining, only once enough work is done to extrapolate
//!
//! Statuses are fire-and-forget values delivered through a [`ProgressSink`].
//! Sinks may be called from the transcoder's progress loop while the
//! pipeline is awaiting, so they must be `Send + Sync`.

use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Pipeline phase a status belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProcessingPhase {
    Idle,
    Analysis,
    Validation,
    Processing,
    Finalization,
    Completed,
    Error,
}

/// One progress record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStatus {
    pub phase: ProcessingPhase,

    /// Message to show, `None` for pure percentage updates
    pub message: Option<String>,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,

    /// Estimated time remaining, serialized as seconds
    #[serde(serialize_with = "serialize_secs")]
    pub estimated_remaining: Option<Duration>,
}

fn serialize_secs<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

impl ProcessingStatus {
    /// Status carrying only a message
    pub fn message<S: Into<String>>(phase: ProcessingPhase, message: S) -> Self {
        Self {
            phase,
            message: Some(message.into()),
            percentage: 0.0,
            estimated_remaining: None,
        }
    }

    /// Transcoder progress update
    pub fn progress(percentage: f64, estimated_remaining: Option<Duration>) -> Self {
        Self {
            phase: ProcessingPhase::Processing,
            message: None,
            percentage: percentage.clamp(0.0, 100.0),
            estimated_remaining,
        }
    }

    /// Terminal success status
    pub fn completed<S: Into<String>>(message: S) -> Self {
        Self {
            phase: ProcessingPhase::Completed,
            message: Some(message.into()),
            percentage: 100.0,
            estimated_remaining: None,
        }
    }

    /// Terminal failure status
    pub fn error<S: AsRef<str>>(message: S) -> Self {
        Self::message(
            ProcessingPhase::Error,
            format!("An error occurred: {}", message.as_ref()),
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            ProcessingPhase::Completed | ProcessingPhase::Error
        )
    }

    /// Format ETR as human-readable string (e.g., "5m 30s")
    pub fn eta_string(&self) -> String {
        let Some(remaining) = self.estimated_remaining else {
            return "calculating...".to_string();
        };

        let total = remaining.as_secs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Receiver of status records
pub trait ProgressSink: Send + Sync {
    fn report(&self, status: ProcessingStatus);
}

impl<F> ProgressSink for F
where
    F: Fn(ProcessingStatus) + Send + Sync,
{
    fn report(&self, status: ProcessingStatus) {
        self(status)
    }
}

/// Shared sink handle passed through the pipeline
pub type SharedSink = Arc<dyn ProgressSink>;

/// Sink that drops every status
pub fn noop_sink() -> SharedSink {
    Arc::new(|_status: ProcessingStatus| {})
}

/// Percentage and ETR for a transcoder position
///
/// `elapsed` is the media position reported by the tool, `total` the expected
/// output duration, and `wall` the real time spent so far. Returns `None` when
/// no total is known.
pub fn estimate(
    elapsed: Duration,
    total: Duration,
    wall: Duration,
) -> Option<(f64, Option<Duration>)> {
    if total.is_zero() {
        return None;
    }

    let percentage = (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).min(100.0);

    // Below 1% the extrapolation is mostly noise
    let remaining = if percentage > 1.0 {
        let wall_secs = wall.as_secs_f64();
        let projected = wall_secs / (percentage / 100.0);
        Duration::try_from_secs_f64((projected - wall_secs).max(0.0)).ok()
    } else {
        None
    };

    Some((percentage, remaining))
}

/// Turns transcoder positions into progress statuses for one invocation
#[derive(Debug)]
pub struct ProgressEstimator {
    total: Duration,
    started: Instant,
}

impl ProgressEstimator {
    /// Start measuring wall time now
    pub fn new(total: Duration) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    /// Status for the given media position, if a total is known
    pub fn update(&self, elapsed: Duration) -> Option<ProcessingStatus> {
        estimate(elapsed, self.total, self.started.elapsed())
            .map(|(pct, remaining)| ProcessingStatus::progress(pct, remaining))
    }
}
