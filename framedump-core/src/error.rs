//! Error types for the dump stream protocol.
//!
//! All fallible operations return `Result<T, StreamError>`.
//! Framing and I/O errors are fatal to a session; everything a client
//! can trigger with a well-formed but invalid request is reported on
//! the wire instead and never reaches this type.

use thiserror::Error;

/// The canonical error type for the dump stream server.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Framing Errors ───────────────────────────────────────────
    /// The main type nibble of a packet was not Request.
    #[error("unexpected main type {0:#x}: only requests are accepted")]
    UnexpectedMainType(u8),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u32 },

    /// The declared payload length exceeds the receive buffer.
    #[error("request too large: {size} bytes (max {max})")]
    RequestTooLarge { size: usize, max: usize },

    /// A request payload is shorter than its fixed wire layout.
    #[error("short {what} payload: {actual} bytes, need {expected}")]
    ShortPayload {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The peer closed the connection mid-packet.
    #[error("connection closed by peer")]
    Disconnected,

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    // ── Hardware Errors ──────────────────────────────────────────
    /// Mapping a register block or dump region failed.
    #[error("cannot map {what} at {address:#x} ({size} bytes): {source}")]
    Map {
        what: &'static str,
        address: u64,
        size: usize,
        source: std::io::Error,
    },

    /// The kernel memory device could not be opened.
    #[error("cannot open {path}: {source}")]
    MemDevice {
        path: String,
        source: std::io::Error,
    },

    /// An interleaved reconfiguration grew the frame past the mapped
    /// ring unit; the stream cannot continue safely.
    #[error("frame of {needed} bytes exceeds the {available}-byte ring unit")]
    FrameExceedsSlot { needed: usize, available: usize },
}

impl StreamError {
    /// Whether this error came from the wire layer (as opposed to the
    /// hardware layer). Wire errors carry no response; the connection
    /// is simply dropped.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            StreamError::UnexpectedMainType(_)
                | StreamError::UnknownVariant { .. }
                | StreamError::RequestTooLarge { .. }
                | StreamError::ShortPayload { .. }
                | StreamError::Disconnected
        )
    }
}
