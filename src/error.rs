//! Unified error types for Arbor.
//!
//! Errors fall into three groups: load-time validation failures (fatal to a
//! content load or reload), per-event rejections (reported to the caller,
//! progress untouched), and infrastructure failures (storage, serialization,
//! configuration). Notification fan-out is informational and uses the
//! [`FailOpen`] helpers instead of propagating.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::loader::ValidationReport;

/// The main error type for Arbor operations.
#[derive(Error, Debug)]
pub enum ArborError {
    /// I/O errors from record, log, or course file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading or validation errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// Course data failed validation. Carries every violation found.
    #[error("course validation failed:\n{report}")]
    Validation { report: ValidationReport },

    /// An event referenced a skill that is not in the loaded graph.
    #[error("no such skill: {skill_id}")]
    UnknownSkill { skill_id: String },

    /// An event carried negative raw points.
    #[error("negative points: {points}")]
    NegativePoints { points: i64 },

    /// An event named a track outside the configured set.
    #[error("no such track: {track}")]
    UnknownTrack { track: String },

    /// A supplied mastery percentage was outside 0..=100.
    #[error("invalid mastery percentage: {value}")]
    InvalidMastery { value: f64 },

    /// A consistency score was outside 0..=1.
    #[error("invalid consistency score: {value}")]
    InvalidConsistency { value: f64 },

    /// An identifier cannot be used as a storage key.
    #[error("invalid identifier: {id:?}")]
    InvalidId { id: String },

    /// State machine or lookup violations.
    #[error("invalid state: {message}")]
    InvalidState { message: String },
}

/// A specialized Result type for Arbor operations.
pub type Result<T> = std::result::Result<T, ArborError>;

impl ArborError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a validation error from a report.
    pub fn validation(report: ValidationReport) -> Self {
        Self::Validation { report }
    }

    /// Create an unknown skill error.
    pub fn unknown_skill(skill_id: impl Into<String>) -> Self {
        Self::UnknownSkill {
            skill_id: skill_id.into(),
        }
    }

    /// Create an unknown track error.
    pub fn unknown_track(track: impl Into<String>) -> Self {
        Self::UnknownTrack {
            track: track.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether this error rejects a single event or tick.
    ///
    /// Rejections leave progress untouched; the caller decides whether to
    /// retry, log, or drop the input.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnknownSkill { .. }
                | Self::NegativePoints { .. }
                | Self::UnknownTrack { .. }
                | Self::InvalidMastery { .. }
                | Self::InvalidConsistency { .. }
                | Self::InvalidId { .. }
        )
    }
}

impl From<io::Error> for ArborError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for ArborError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Used where a failure must not affect the outcome already committed, such
/// as notification fan-out after a record has been persisted.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the Arbor CLI.
pub mod exit_codes {
    /// Command completed.
    pub const OK: i32 = 0;

    /// Infrastructure or usage failure.
    pub const ERROR: i32 = 1;

    /// Course data failed validation.
    pub const VALIDATION: i32 = 2;

    /// An event or tick was rejected.
    pub const REJECTED: i32 = 3;
}
