//! Wire packet layout for the dump stream protocol.
//!
//! All multi-byte fields are big-endian. The hardware access layer is
//! host-endian; conversions happen here and nowhere else.
//!
//! ## Wire format
//!
//! **Packet head** (8 bytes, every message starts with one):
//! ```text
//! type:        u16  (main_type << 8 | message_type)
//! error_code:  u16
//! length:      u32  (payload bytes that follow)
//! ```
//!
//! **Video data head** (12 bytes, follows the packet head of a video
//! data frame, then `width × height × 3` raw pixels):
//! ```text
//! frame_number: u32
//! width:        u16
//! height:       u16
//! channel:      u8
//! padding:      [u8; 3]
//! ```
//!
//! **Audio data head** (4 bytes, then exactly 4096 bytes of PCM):
//! ```text
//! page_count:   u32
//! ```

use crate::error::StreamError;
use crate::message::{ErrorCode, MainType, MessageKind};

/// Protocol version reported by GetVersion.
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;

// ── PacketHead ───────────────────────────────────────────────────

/// The common 8-byte head of every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHead {
    /// `(main_type << 8) | message_type`.
    pub type_code: u16,
    pub error_code: u16,
    /// Number of payload bytes following the head.
    pub length: u32,
}

impl PacketHead {
    /// Encoded size on the wire.
    pub const SIZE: usize = 8;

    /// Head of a request packet (used by clients and tests).
    pub fn request(kind: MessageKind, length: u32) -> Self {
        Self {
            type_code: (MainType::Request as u16) << 8 | kind as u16,
            error_code: 0,
            length,
        }
    }

    /// Head of a terminal response to `kind`.
    pub fn response(kind: MessageKind, code: ErrorCode, length: u32) -> Self {
        Self {
            type_code: (MainType::Response as u16) << 8 | kind as u16,
            error_code: code as u16,
            length,
        }
    }

    /// Head of a streamed data frame for `kind`.
    pub fn data(kind: MessageKind, length: u32) -> Self {
        Self {
            type_code: (MainType::Data as u16) << 8 | kind as u16,
            error_code: 0,
            length,
        }
    }

    /// High byte of the type field.
    pub fn main_type(&self) -> Result<MainType, StreamError> {
        MainType::try_from((self.type_code >> 8) as u8)
    }

    /// Low byte of the type field, unvalidated.
    pub fn message_type(&self) -> u8 {
        (self.type_code & 0xFF) as u8
    }

    /// Serialize to bytes (big-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.type_code.to_be_bytes());
        buf[2..4].copy_from_slice(&self.error_code.to_be_bytes());
        buf[4..8].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    /// Deserialize from bytes.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < Self::SIZE {
            return Err(StreamError::ShortPayload {
                what: "PacketHead",
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            type_code: u16::from_be_bytes([data[0], data[1]]),
            error_code: u16::from_be_bytes([data[2], data[3]]),
            length: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        })
    }
}

// ── Request payloads ─────────────────────────────────────────────

/// Payload of ConfigVideoStream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigVideoStreamRequest {
    pub screen_width: u16,
    pub screen_height: u16,
}

impl ConfigVideoStreamRequest {
    pub const SIZE: usize = 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..2].copy_from_slice(&self.screen_width.to_be_bytes());
        buf[2..4].copy_from_slice(&self.screen_height.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("ConfigVideoStream", Self::SIZE, data)?;
        Ok(Self {
            screen_width: u16::from_be_bytes([data[0], data[1]]),
            screen_height: u16::from_be_bytes([data[2], data[3]]),
        })
    }
}

/// Payload of ConfigShrinkVideoStream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigShrinkVideoStreamRequest {
    pub shrink_width: u8,
    pub shrink_height: u8,
}

impl ConfigShrinkVideoStreamRequest {
    pub const SIZE: usize = 2;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        [self.shrink_width, self.shrink_height]
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("ConfigShrinkVideoStream", Self::SIZE, data)?;
        Ok(Self {
            shrink_width: data[0],
            shrink_height: data[1],
        })
    }
}

/// Payload of DumpVideoFrame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpVideoFrameRequest {
    /// Physical base address of channel 0; 0 means unused.
    pub memory_address1: u32,
    /// Physical base address of channel 1; 0 means unused.
    pub memory_address2: u32,
    pub number_of_frames: u16,
}

impl DumpVideoFrameRequest {
    pub const SIZE: usize = 10;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.memory_address1.to_be_bytes());
        buf[4..8].copy_from_slice(&self.memory_address2.to_be_bytes());
        buf[8..10].copy_from_slice(&self.number_of_frames.to_be_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("DumpVideoFrame", Self::SIZE, data)?;
        Ok(Self {
            memory_address1: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            memory_address2: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            number_of_frames: u16::from_be_bytes([data[8], data[9]]),
        })
    }
}

/// Payload of DumpRealtimeVideoFrame.
///
/// `mode` stays a raw byte here: an out-of-range value is a request
/// validation error (answered on the wire), not a framing error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpRealtimeVideoRequest {
    pub is_dual: bool,
    pub mode: u8,
}

impl DumpRealtimeVideoRequest {
    pub const SIZE: usize = 2;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        [self.is_dual as u8, self.mode]
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("DumpRealtimeVideoFrame", Self::SIZE, data)?;
        Ok(Self {
            is_dual: data[0] != 0,
            mode: data[1],
        })
    }
}

/// Payload of DumpRealtimeAudioPage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpRealtimeAudioRequest {
    pub mode: u8,
}

impl DumpRealtimeAudioRequest {
    pub const SIZE: usize = 1;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        [self.mode]
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("DumpRealtimeAudioPage", Self::SIZE, data)?;
        Ok(Self { mode: data[0] })
    }
}

// ── Data heads ───────────────────────────────────────────────────

/// Per-frame head of a video data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDataHead {
    pub frame_number: u32,
    pub width: u16,
    pub height: u16,
    /// Slot index of the source channel (0 or 1).
    pub channel: u8,
}

impl VideoDataHead {
    /// Encoded size on the wire, padding included.
    pub const SIZE: usize = 12;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.frame_number.to_be_bytes());
        buf[4..6].copy_from_slice(&self.width.to_be_bytes());
        buf[6..8].copy_from_slice(&self.height.to_be_bytes());
        buf[8] = self.channel;
        // bytes 9..12 are explicit padding, always zero
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("VideoDataHead", Self::SIZE, data)?;
        Ok(Self {
            frame_number: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            width: u16::from_be_bytes([data[4], data[5]]),
            height: u16::from_be_bytes([data[6], data[7]]),
            channel: data[8],
        })
    }
}

/// Per-page head of an audio data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDataHead {
    pub page_count: u32,
}

impl AudioDataHead {
    pub const SIZE: usize = 4;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        self.page_count.to_be_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        check_len("AudioDataHead", Self::SIZE, data)?;
        Ok(Self {
            page_count: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
        })
    }
}

// ── Packet ───────────────────────────────────────────────────────

/// A complete small packet: head plus owned payload.
///
/// Used for responses and by test clients. Streamed data frames are
/// written head-first instead, so multi-megabyte pixel payloads are
/// never copied into an intermediate packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub head: PacketHead,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a request packet (client side).
    pub fn request(kind: MessageKind, payload: Vec<u8>) -> Self {
        Self {
            head: PacketHead::request(kind, payload.len() as u32),
            payload,
        }
    }

    /// Build a terminal response carrying an optional text body.
    pub fn response(kind: MessageKind, code: ErrorCode, payload: Vec<u8>) -> Self {
        Self {
            head: PacketHead::response(kind, code, payload.len() as u32),
            payload,
        }
    }

    /// Serialize head and payload contiguously.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PacketHead::SIZE + self.payload.len());
        buf.extend_from_slice(&self.head.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

fn check_len(what: &'static str, expected: usize, data: &[u8]) -> Result<(), StreamError> {
    if data.len() < expected {
        return Err(StreamError::ShortPayload {
            what,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_head_roundtrip() {
        let head = PacketHead::response(MessageKind::DumpVideoFrame, ErrorCode::Argument, 17);
        let encoded = head.encode();
        assert_eq!(encoded.len(), PacketHead::SIZE);
        assert_eq!(PacketHead::decode(&encoded).unwrap(), head);
    }

    #[test]
    fn packet_head_wire_values() {
        // GetVersion request: type 0x0001, no error, no payload.
        let head = PacketHead::request(MessageKind::GetVersion, 0);
        assert_eq!(head.encode(), [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

        // GetVersion response: type 0x0101, length 2.
        let head = PacketHead::response(MessageKind::GetVersion, ErrorCode::Ok, 2);
        assert_eq!(head.encode(), [0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02]);

        // Realtime video data frame head carries type 0x0205.
        let head = PacketHead::data(MessageKind::DumpRealtimeVideoFrame, 4108);
        assert_eq!(head.encode()[0..2], [0x02, 0x05]);
    }

    #[test]
    fn packet_head_too_short() {
        assert!(PacketHead::decode(&[0u8; 7]).is_err());
    }

    #[test]
    fn config_video_stream_wire_values() {
        // 640 × 480 encodes as 02 80 01 E0.
        let req = ConfigVideoStreamRequest {
            screen_width: 640,
            screen_height: 480,
        };
        assert_eq!(req.encode(), [0x02, 0x80, 0x01, 0xE0]);
        assert_eq!(ConfigVideoStreamRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn dump_video_frame_roundtrip() {
        let req = DumpVideoFrameRequest {
            memory_address1: 0xC100_0000,
            memory_address2: 0,
            number_of_frames: 30,
        };
        assert_eq!(DumpVideoFrameRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn realtime_requests_roundtrip() {
        let req = DumpRealtimeVideoRequest {
            is_dual: true,
            mode: 2,
        };
        assert_eq!(DumpRealtimeVideoRequest::decode(&req.encode()).unwrap(), req);

        let req = DumpRealtimeAudioRequest { mode: 1 };
        assert_eq!(DumpRealtimeAudioRequest::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn short_request_payload_rejected() {
        assert!(ConfigVideoStreamRequest::decode(&[0x02, 0x80]).is_err());
        assert!(DumpVideoFrameRequest::decode(&[0u8; 9]).is_err());
        assert!(DumpRealtimeAudioRequest::decode(&[]).is_err());
    }

    #[test]
    fn video_data_head_roundtrip() {
        let head = VideoDataHead {
            frame_number: 42,
            width: 960,
            height: 540,
            channel: 1,
        };
        let encoded = head.encode();
        assert_eq!(encoded.len(), VideoDataHead::SIZE);
        // Padding bytes are zero.
        assert_eq!(&encoded[9..12], &[0, 0, 0]);
        assert_eq!(VideoDataHead::decode(&encoded).unwrap(), head);
    }

    #[test]
    fn audio_data_head_roundtrip() {
        let head = AudioDataHead { page_count: 123456 };
        assert_eq!(AudioDataHead::decode(&head.encode()).unwrap(), head);
    }

    #[test]
    fn packet_to_bytes_layout() {
        let pkt = Packet::response(
            MessageKind::DumpVideoFrame,
            ErrorCode::Argument,
            b"Frame number is 0".to_vec(),
        );
        let bytes = pkt.to_bytes();
        assert_eq!(bytes.len(), PacketHead::SIZE + 17);
        assert_eq!(&bytes[0..2], &[0x01, 0x04]);
        assert_eq!(&bytes[2..4], &[0x00, 0x02]);
        assert_eq!(&bytes[8..], b"Frame number is 0");
    }
}
