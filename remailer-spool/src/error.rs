//! Error types for the remailer-spool crate.

use std::io;

use remailer_common::{ErrorKind, FileStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The last refresh found no `df`/`qf` pairs.
    #[error("no files found")]
    NoFilesFound,

    /// Every unit from the last refresh has been handed out.
    #[error("no more files to read")]
    Exhausted,

    /// The unit cannot be worked on right now; the caller moves on.
    #[error("skipping {id}: {reason}")]
    Skip { id: String, reason: SkipReason },

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

impl SpoolError {
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Config,
            _ => ErrorKind::Io,
        }
    }
}

#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("status is {0}")]
    Status(FileStatus),

    #[error("claimed by another worker")]
    ClaimLost,

    #[error("partner file {0} is missing")]
    MissingPartner(String),

    #[error("{0}")]
    Io(io::Error),
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Spool path does not exist: {0}")]
    PathNotFound(String),

    #[error("Spool path cannot contain '..' components: {0}")]
    ParentComponent(String),

    #[error("Spool path is not a directory: {0}")]
    NotDirectory(String),

    #[error("Spool path cannot be in system directory {prefix}: {path}")]
    SystemDirectory { prefix: &'static str, path: String },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    /// No entry exists for the key; callers treat this as re-claimable.
    #[error("no tracker entry for {0}")]
    NotFound(String),

    #[error("invalid status code {value} stored under {key}")]
    InvalidStatus { key: String, value: i64 },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl TrackerError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

pub type Result<T> = std::result::Result<T, SpoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_spool_message() {
        assert_eq!(SpoolError::NoFilesFound.to_string(), "no files found");
    }

    #[test]
    fn skip_classification() {
        let err = SpoolError::Skip {
            id: "001".to_string(),
            reason: SkipReason::Status(FileStatus::Done),
        };
        assert!(err.is_skip());
        assert_eq!(err.to_string(), "skipping 001: status is DONE");
        assert!(!SpoolError::Exhausted.is_skip());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let spool_err = SpoolError::from(io_err);

        assert!(matches!(spool_err, SpoolError::Io(_)));
        assert_eq!(spool_err.kind(), ErrorKind::Io);
        assert!(spool_err.to_string().contains("access denied"));
    }
}
