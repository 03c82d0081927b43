//! Protocol-level errors for frame processing
//!
//! Each variant carries enough context to explain what was on the wire.
//! The read path uses [`ProtocolError::is_recoverable`] to decide between
//! discarding a single frame and ending the session.

use thiserror::Error;

/// Frame decoding errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Declared body length is larger than any valid frame
    #[error("Frame too large: {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Body is too small to contain the expected structure
    #[error("Message too small: need {need} bytes, got {got} (context: {context})")]
    MessageTooSmall {
        need: usize,
        got: usize,
        context: String,
    },

    /// Magic number validation failed
    #[error("Invalid magic number: expected {expected:#06x}, got {actual:#06x}")]
    InvalidMagic { expected: u16, actual: u16 },

    /// Version byte is not understood by this build
    #[error("Unsupported version {version}: supported version is {supported}")]
    UnsupportedVersion { version: u8, supported: u8 },

    /// Kind byte does not name a known frame
    #[error("Unknown frame kind {kind}: valid kinds are 1 (Hello) and 2 (Clock)")]
    UnknownFrameKind { kind: u8 },

    /// Payload checksum validation failed
    #[error("Checksum mismatch: expected {expected:#010x}, calculated {calculated:#010x}")]
    ChecksumMismatch { expected: u32, calculated: u32 },

    /// Payload size does not match the size required by the frame kind
    #[error("Payload size mismatch for {kind}: expected {expected} bytes, got {got}")]
    PayloadSizeMismatch {
        kind: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Result type for codec operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

impl ProtocolError {
    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    pub fn message_too_small(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::MessageTooSmall {
            need,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_magic(expected: u16, actual: u16) -> Self {
        Self::InvalidMagic { expected, actual }
    }

    pub fn checksum_mismatch(expected: u32, calculated: u32) -> Self {
        Self::ChecksumMismatch {
            expected,
            calculated,
        }
    }

    /// Whether the reader can drop this frame and keep the stream.
    ///
    /// Only an oversized length prefix leaves the reader unable to find the
    /// next frame boundary.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProtocolError::FrameTooLarge { .. })
    }

    /// Error category for log fields
    pub fn category(&self) -> &'static str {
        match self {
            ProtocolError::FrameTooLarge { .. } => "frame_too_large",
            ProtocolError::MessageTooSmall { .. } => "message_too_small",
            ProtocolError::InvalidMagic { .. } => "invalid_magic",
            ProtocolError::UnsupportedVersion { .. } => "unsupported_version",
            ProtocolError::UnknownFrameKind { .. } => "unknown_frame_kind",
            ProtocolError::ChecksumMismatch { .. } => "checksum_mismatch",
            ProtocolError::PayloadSizeMismatch { .. } => "payload_size_mismatch",
        }
    }
}
