// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors surfaced by spinlink operations.

use std::time::Duration;

use crate::protocol::constants::{ScpCommand, ScpResult};
use crate::protocol::CoreAddr;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by spinlink operations.
///
/// The pipeline converts retry-code responses that survive all retries into
/// [`Error::RequestFailed`] carrying the retry-reason history; responses that
/// were purely timeouts become [`Error::Timeout`].
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Transport errors
    // ========================================================================
    /// Socket send/receive failed.
    Io(std::io::Error),
    /// A request gave up after retries with at least one non-timeout reason.
    RequestFailed {
        /// Command that was being sent.
        command: ScpCommand,
        /// Destination core of the request.
        destination: CoreAddr,
        /// Number of retries that were allowed.
        n_retries: u32,
        /// Reason recorded for each retransmission.
        reasons: Vec<&'static str>,
    },
    /// Retries exhausted with only timeouts.
    Timeout {
        /// Command that was being sent.
        command: ScpCommand,
        /// Per-packet timeout in force when the request was abandoned.
        timeout: Duration,
    },
    /// No registered endpoint can carry the request.
    UnsupportedOperation(String),
    /// The transceiver was closed before or during the operation.
    Closed,

    // ========================================================================
    // Protocol errors
    // ========================================================================
    /// The monitor returned a non-OK code outside the retry set.
    UnexpectedResponse {
        /// Operation the caller asked for.
        operation: &'static str,
        /// Command that produced the response.
        command: ScpCommand,
        /// Result code the monitor returned.
        result: ScpResult,
    },
    /// A received frame violates the declared SDP/SCP layout.
    MalformedPacket(String),
    /// RouterAlloc returned base address 0.
    OutOfRoutingSpace {
        /// Chip whose router was full.
        x: u8,
        /// Chip whose router was full.
        y: u8,
        /// Entries that were requested.
        n_entries: usize,
    },
    /// The monitor kernel name or version does not match expectations.
    Incompatible {
        /// Name/version this library requires.
        expected: String,
        /// Name/version the machine reported.
        observed: String,
    },

    // ========================================================================
    // Caller errors
    // ========================================================================
    /// An argument violates a documented bound.
    InvalidParameter {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: String,
        /// Bound that was violated.
        reason: &'static str,
    },

    // ========================================================================
    // Wrappers
    // ========================================================================
    /// A BMP operation failed; carries the board position for diagnostics.
    Bmp {
        /// Cabinet containing the frame.
        cabinet: u8,
        /// Frame containing the board.
        frame: u8,
        /// Board the request addressed.
        board: u8,
        /// Underlying failure.
        cause: Box<Error>,
    },
    /// First failure of an aggregate operation, plus a count of later ones.
    Process {
        /// Destination core of the first failing request.
        destination: CoreAddr,
        /// The first failure.
        cause: Box<Error>,
        /// Failures that followed the first (usually sharing its cause).
        n_other: usize,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Transport
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::RequestFailed {
                command,
                destination,
                n_retries,
                reasons,
            } => write!(
                f,
                "I/O error sending {:?} to {},{},{} over {} retries: {:?}",
                command, destination.x, destination.y, destination.p, n_retries, reasons
            ),
            Error::Timeout { command, timeout } => {
                write!(f, "{:?} timed out after {:?}", command, timeout)
            }
            Error::UnsupportedOperation(kind) => {
                write!(f, "no connection can carry a {} message", kind)
            }
            Error::Closed => write!(f, "transceiver is closed"),
            // Protocol
            Error::UnexpectedResponse {
                operation,
                command,
                result,
            } => write!(
                f,
                "{} ({:?}) answered with unexpected code {}",
                operation,
                command,
                result.name()
            ),
            Error::MalformedPacket(msg) => write!(f, "malformed packet: {}", msg),
            Error::OutOfRoutingSpace { x, y, n_entries } => write!(
                f,
                "router on {},{} has no space for {} entries",
                x, y, n_entries
            ),
            Error::Incompatible { expected, observed } => {
                write!(f, "incompatible monitor: expected {}, got {}", expected, observed)
            }
            // Caller
            Error::InvalidParameter {
                field,
                value,
                reason,
            } => write!(f, "invalid {} = {}: {}", field, value, reason),
            // Wrappers
            Error::Bmp {
                cabinet,
                frame,
                board,
                cause,
            } => write!(
                f,
                "BMP cabinet {} frame {} board {}: {}",
                cabinet, frame, board, cause
            ),
            Error::Process {
                destination,
                cause,
                n_other,
            } => write!(
                f,
                "request to {},{},{} failed ({} later failures dropped): {}",
                destination.x, destination.y, destination.p, n_other, cause
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Bmp { cause, .. } | Error::Process { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_request_failed() {
        let err = Error::RequestFailed {
            command: ScpCommand::Read,
            destination: CoreAddr::new(1, 2, 0),
            n_retries: 3,
            reasons: vec!["timeout", "RC_LEN"],
        };
        let text = err.to_string();
        assert!(text.contains("1,2,0"), "missing destination: {}", text);
        assert!(text.contains("RC_LEN"), "missing reason history: {}", text);
    }

    #[test]
    fn test_source_chains_through_wrappers() {
        use std::error::Error as _;
        let inner = Error::Closed;
        let wrapped = Error::Bmp {
            cabinet: 0,
            frame: 0,
            board: 3,
            cause: Box::new(inner),
        };
        assert!(wrapped.source().is_some());
    }
}
