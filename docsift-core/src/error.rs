//! Error types for the extraction pipeline.
//!
//! Per-document failures (`ExtractError`) are recoverable by the caller:
//! log, skip the file, continue. Queue and scan failures (`QueueError`,
//! `ScanError`) are infrastructure failures and abort the current scan.

use crate::decoders::{DecoderId, MediaType};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure raised by a single decoder while decoding one input.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Per-document extraction failure. No Document is produced.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to open {}: {source}", path.display())]
    StreamOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing excluded media type: {0}")]
    ExcludedType(MediaType),

    #[error("unsupported media type: {0}")]
    UnsupportedType(MediaType),

    #[error("{decoder} failed to decode {media_type}: {source}")]
    Decode {
        decoder: DecoderId,
        media_type: MediaType,
        #[source]
        source: DecodeError,
    },
}

impl ExtractError {
    /// True when the failure comes from the fallback decoder rejecting a type
    /// rather than from a decoder that tried and failed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ExcludedType(_) | Self::UnsupportedType(_))
    }
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue {name} is closed")]
    Closed { name: String },

    #[error("push to queue {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },

    #[error("queue {name} is disconnected")]
    Disconnected { name: String },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan root {} is not accessible: {source}", root.display())]
    RootInaccessible {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scan root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid path filter: {0}")]
    Filter(#[from] ignore::Error),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_type_display() {
        let err = ExtractError::ExcludedType(MediaType::from("image/png"));
        assert_eq!(err.to_string(), "parsing excluded media type: image/png");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_decode_error_is_not_rejection() {
        let err = ExtractError::Decode {
            decoder: DecoderId::PDF,
            media_type: MediaType::from("application/pdf"),
            source: DecodeError::Malformed("no trailer".to_string()),
        };
        assert!(!err.is_rejection());
        assert_eq!(
            err.to_string(),
            "pdf failed to decode application/pdf: malformed input: no trailer"
        );
    }

    #[test]
    fn test_queue_error_converts_into_scan_error() {
        let err: ScanError = QueueError::Closed {
            name: "extract:queue_alice".to_string(),
        }
        .into();
        assert!(matches!(err, ScanError::Queue(QueueError::Closed { .. })));
    }
}
