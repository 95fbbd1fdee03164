//! Protocol message types and error codes.
//!
//! Uses proper enums with `TryFrom` — no panics on unknown values.
//! The numeric values are a wire contract shared with the clients and
//! must not be reordered.

use std::fmt;

use crate::error::StreamError;

// ── MainType ─────────────────────────────────────────────────────

/// High byte of the packet `type` field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MainType {
    /// Client → server.
    Request = 0,
    /// Server → client, terminal reply to a request.
    Response = 1,
    /// Server → client, streamed frame/page data.
    Data = 2,
}

impl TryFrom<u8> for MainType {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MainType::Request),
            1 => Ok(MainType::Response),
            2 => Ok(MainType::Data),
            _ => Err(StreamError::UnknownVariant {
                type_name: "MainType",
                value: value as u32,
            }),
        }
    }
}

// ── MessageKind ──────────────────────────────────────────────────

/// Low byte of the packet `type` field.
///
/// The server dispatches on this value; anything ≥ 9 is a framing
/// error that terminates the session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Clear session configuration back to defaults.
    Reset = 0,
    /// Query the protocol version.
    GetVersion = 1,
    /// Set the screen geometry for non-realtime dumps.
    ConfigVideoStream = 2,
    /// Set the pixel decimation factors.
    ConfigShrinkVideoStream = 3,
    /// Dump a bounded batch of video frames from given addresses.
    DumpVideoFrame = 4,
    /// Follow the video dump controller in realtime.
    DumpRealtimeVideoFrame = 5,
    /// Stop an active realtime video stream.
    StopDumpVideo = 6,
    /// Follow the audio dump controller in realtime.
    DumpRealtimeAudioPage = 7,
    /// Stop an active realtime audio stream.
    StopDumpAudio = 8,
}

impl TryFrom<u8> for MessageKind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Reset),
            1 => Ok(MessageKind::GetVersion),
            2 => Ok(MessageKind::ConfigVideoStream),
            3 => Ok(MessageKind::ConfigShrinkVideoStream),
            4 => Ok(MessageKind::DumpVideoFrame),
            5 => Ok(MessageKind::DumpRealtimeVideoFrame),
            6 => Ok(MessageKind::StopDumpVideo),
            7 => Ok(MessageKind::DumpRealtimeAudioPage),
            8 => Ok(MessageKind::StopDumpAudio),
            _ => Err(StreamError::UnknownVariant {
                type_name: "MessageKind",
                value: value as u32,
            }),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── ErrorCode ────────────────────────────────────────────────────

/// Error codes carried in the `error_code` field of responses.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok = 0,
    NonSupportCommand = 1,
    Argument = 2,
    RealtimeStreamExists = 3,
    VideoMemoryOverflowStop = 4,
    VideoMemoryOverflowDrop = 5,
    AudioMemoryOverflowStop = 6,
    AudioMemoryOverflowDrop = 7,
    MemoryAllocFail = 8,
}

// ── OverflowPolicy ───────────────────────────────────────────────

/// What to do when the dump ring wraps past the oldest unread slot.
///
/// Carried in the `mode` byte of realtime dump requests. Value 0
/// (non-realtime) is not a valid request mode.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Report the overflow and end the stream.
    StopWhenOverflow = 1,
    /// Report the dropped count, skip ahead, keep streaming.
    BestEffort = 2,
}

impl TryFrom<u8> for OverflowPolicy {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(OverflowPolicy::StopWhenOverflow),
            2 => Ok(OverflowPolicy::BestEffort),
            _ => Err(StreamError::UnknownVariant {
                type_name: "OverflowPolicy",
                value: value as u32,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_type_roundtrip() {
        for mt in [MainType::Request, MainType::Response, MainType::Data] {
            assert_eq!(MainType::try_from(mt as u8).unwrap(), mt);
        }
        assert!(MainType::try_from(3).is_err());
    }

    #[test]
    fn message_kind_roundtrip() {
        let kinds = [
            MessageKind::Reset,
            MessageKind::GetVersion,
            MessageKind::ConfigVideoStream,
            MessageKind::ConfigShrinkVideoStream,
            MessageKind::DumpVideoFrame,
            MessageKind::DumpRealtimeVideoFrame,
            MessageKind::StopDumpVideo,
            MessageKind::DumpRealtimeAudioPage,
            MessageKind::StopDumpAudio,
        ];
        for kind in kinds {
            assert_eq!(MessageKind::try_from(kind as u8).unwrap(), kind);
        }
    }

    #[test]
    fn message_kind_out_of_range() {
        assert!(MessageKind::try_from(9).is_err());
        assert!(MessageKind::try_from(0xFF).is_err());
    }

    #[test]
    fn overflow_policy_rejects_non_realtime() {
        assert!(OverflowPolicy::try_from(0).is_err());
        assert_eq!(
            OverflowPolicy::try_from(1).unwrap(),
            OverflowPolicy::StopWhenOverflow
        );
        assert_eq!(OverflowPolicy::try_from(2).unwrap(), OverflowPolicy::BestEffort);
        assert!(OverflowPolicy::try_from(3).is_err());
    }
}
