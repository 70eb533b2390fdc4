//! Error types for hexsweep
//!
//! This module defines the error hierarchy that covers:
//! - Session errors (authentication, map fetch, response parsing, store queries)
//! - Spawn schedule errors (file loading, validation)
//! - Configuration and CLI errors
//! - Worker thread errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Errors should be actionable - include context about what to do
//! - Per-job results are `ScanOutcome` values, not errors

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for hexsweep
#[derive(Error, Debug)]
pub enum ScanError {
    /// Session and collaborator errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Spawn schedule errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Interrupted by signal
    #[error("Operation interrupted by signal")]
    Interrupted,

    /// Channel closed unexpectedly
    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

/// Errors raised by the session, parser and store collaborators
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    /// Authentication was rejected
    #[error("Authentication failed for '{username}' via {provider}: {reason}")]
    Auth {
        provider: String,
        username: String,
        reason: String,
    },

    /// Map request failed in transport
    #[error("Map request failed: {reason}")]
    Fetch { reason: String },

    /// Map request returned nothing usable
    #[error("Map request returned an empty response")]
    EmptyResponse,

    /// Parser rejected the response payload
    #[error("Malformed map response: {reason}")]
    Malformed { reason: String },

    /// Spawn point store query failed
    #[error("Spawn store query failed: {reason}")]
    Store { reason: String },
}

impl SessionError {
    /// Check if the scan that produced this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Fetch { .. } | SessionError::EmptyResponse | SessionError::Malformed { .. }
        )
    }
}

/// Spawn schedule loading and validation errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// Nothing to schedule
    #[error("Spawn schedule is empty - scan the area in grid mode first or provide a spawn file")]
    Empty,

    /// Schedule file could not be read or written
    #[error("Cannot access spawn file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Schedule file is not a valid record array
    #[error("Spawn file '{path}' is not valid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A record has a time outside the hour
    #[error("Spawn time {time} is outside [0, 3600)")]
    InvalidTime { time: f64 },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Account spec could not be parsed
    #[error("Invalid account '{value}': {reason} (expected PROVIDER:USERNAME:PASSWORD)")]
    InvalidAccount { value: String, reason: String },

    /// Location spec could not be parsed
    #[error("Invalid location '{value}': {reason} (expected LAT,LNG)")]
    InvalidLocation { value: String, reason: String },

    /// Numeric parameter out of range
    #[error("Invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The selected mode needs a starting location
    #[error("A starting location is required (use --location LAT,LNG)")]
    MissingLocation,

    /// No session backend available
    #[error("No session backend configured - run with --mock or embed hexsweep with a MapSession implementation")]
    NoSessionBackend,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Login kept failing; the session is torn down and restarted
    #[error("Worker {id} exceeded {attempts} login attempts for '{username}'")]
    TooManyLoginAttempts {
        id: usize,
        username: String,
        attempts: u32,
    },

    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Work queue send failed
    #[error("Failed to send scan job: queue closed")]
    QueueSendFailed,

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Session error that escaped the retry loop
    #[error("Worker {id} session error: {source}")]
    Session { id: usize, source: SessionError },
}

/// Result type alias for ScanError
pub type Result<T> = std::result::Result<T, ScanError>;

/// Result type alias for SessionError
pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Result type alias for ScheduleError
pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;

/// Represents the outcome of one scan job
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Scan succeeded and the parser found entities
    Scanned { step: usize, found: usize },

    /// Scan succeeded but nothing was there
    Empty { step: usize },

    /// Spawn job was too stale to be worth scanning
    Skipped { step: usize },

    /// Job failed `scan_retries` times and was dropped
    Abandoned { step: usize, failures: u32 },
}

impl ScanOutcome {
    /// Returns true if the map fetch and parse went through
    pub fn is_success(&self) -> bool {
        matches!(self, ScanOutcome::Scanned { .. } | ScanOutcome::Empty { .. })
    }

    /// Returns the step index associated with this outcome
    pub fn step(&self) -> usize {
        match self {
            ScanOutcome::Scanned { step, .. } => *step,
            ScanOutcome::Empty { step } => *step,
            ScanOutcome::Skipped { step } => *step,
            ScanOutcome::Abandoned { step, .. } => *step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_retryable() {
        assert!(SessionError::EmptyResponse.is_retryable());
        assert!(SessionError::Malformed {
            reason: "missing cells".into()
        }
        .is_retryable());

        let auth = SessionError::Auth {
            provider: "ptc".into(),
            username: "alice".into(),
            reason: "bad password".into(),
        };
        assert!(!auth.is_retryable());
    }

    #[test]
    fn test_error_conversion() {
        let session_err = SessionError::Store {
            reason: "offline".into(),
        };
        let scan_err: ScanError = session_err.into();
        assert!(matches!(scan_err, ScanError::Session(_)));
    }

    #[test]
    fn test_outcome_step() {
        let outcome = ScanOutcome::Abandoned { step: 4, failures: 3 };
        assert_eq!(outcome.step(), 4);
        assert!(!outcome.is_success());
        assert!(ScanOutcome::Empty { step: 1 }.is_success());
    }
}
