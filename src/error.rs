// Hardware Zip Accelerator Streaming Bridge
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for offload sessions.

use thiserror::Error;

/// Errors that can occur while setting up or driving an offload session.
#[derive(Debug, Error)]
pub enum ZipError {
    /// The accelerator refused to open a channel.
    #[error("failed to open accelerator channel: {0}")]
    ChannelOpen(String),

    /// The DMA-visible region could not be reserved.
    #[error("failed to reserve {size} bytes of DMA memory")]
    DmaReservation { size: usize },

    /// Address translation for a DMA region failed.
    #[error("address translation failed for {addr:#018x}")]
    Translation { addr: u64 },

    /// Session configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Work queue stayed busy for the configured number of retries.
    #[error("work queue full after {retries} retries")]
    QueueFull { retries: u32 },

    /// Completion did not arrive within the configured number of polls.
    #[error("no completion after {spins} polls")]
    PollTimeout { spins: u64 },

    /// Hard submission failure reported by the queue.
    #[error("descriptor submission failed: {0}")]
    SubmitFailed(String),

    /// I/O error while receiving a completion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The flow-control state matched no transition.
    #[error("inconsistent flow-control state: {0}")]
    InconsistentState(String),

    /// A completion arrived for a descriptor that is not outstanding.
    #[error("completion tag mismatch: expected {expected}, got {actual}")]
    TagMismatch { expected: u32, actual: u32 },

    /// Completion reported fewer bytes than the wrapper accounting requires.
    #[error("completion produced {produced} bytes, expected at least {required}")]
    ShortCompletion { produced: u32, required: u32 },

    /// The accelerator made no progress and reported an unknown status.
    #[error("accelerator stalled with status {status:#04x}")]
    Stalled { status: u8 },

    /// Stream header is not a supported wrapper header.
    #[error("bad stream header: {0}")]
    BadHeader(String),

    /// Trailer checksum does not match the decoded data.
    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Trailer size field does not match the decoded length.
    #[error("size mismatch: expected {expected}, decoded {actual}")]
    SizeMismatch { expected: u32, actual: u32 },

    /// Input ended before the wrapper was complete.
    #[error("truncated stream: {0}")]
    TruncatedStream(String),

    /// A previous fatal error left the session unusable.
    #[error("session is poisoned by an earlier fatal error")]
    SessionPoisoned,

    /// The session was already torn down.
    #[error("session already ended")]
    SessionEnded,
}

impl ZipError {
    /// Returns true for errors raised while creating a session.
    ///
    /// Callers use this to fall back to a software codec instead of aborting.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::ChannelOpen(_)
                | Self::DmaReservation { .. }
                | Self::Translation { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Returns true if the session must not be stepped again.
    pub fn is_fatal(&self) -> bool {
        !self.is_setup_failure()
    }
}

/// Result type alias for offload operations.
pub type ZipResult<T> = Result<T, ZipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_failures_are_not_fatal() {
        assert!(ZipError::ChannelOpen("no device".into()).is_setup_failure());
        assert!(ZipError::DmaReservation { size: 4096 }.is_setup_failure());
        assert!(!ZipError::DmaReservation { size: 4096 }.is_fatal());
    }

    #[test]
    fn test_runtime_errors_are_fatal() {
        assert!(ZipError::SessionPoisoned.is_fatal());
        assert!(ZipError::Stalled { status: 0x05 }.is_fatal());
        let io = std::io::Error::other("link down");
        assert!(ZipError::from(io).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = ZipError::ChecksumMismatch {
            expected: 0x1234_5678,
            actual: 0x0000_0001,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: expected 0x12345678, computed 0x00000001"
        );
    }
}
