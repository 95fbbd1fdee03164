//! Core library of the capture-board dump stream server.
//!
//! The board's FPGA dump controllers write captured video frames and
//! audio pages into rings of physical memory; this crate serves them
//! to TCP clients. It provides the wire protocol ([`packet`],
//! [`codec`], [`message`]), the hardware access layer ([`hal`]), the
//! dump-ring mapper ([`mapper`]), and the per-connection session
//! state machine ([`session`]) with its realtime pacing ([`pacing`])
//! and pixel decimation ([`shrink`]).

pub mod codec;
pub mod error;
pub mod hal;
pub mod mapper;
pub mod message;
pub mod packet;
pub mod pacing;
pub mod session;
pub mod shrink;

pub use codec::{PacketCodec, RawRequest};
pub use error::StreamError;
pub use hal::{CaptureBoard, Channel, CropWindow, Hal};
pub use message::{ErrorCode, MainType, MessageKind, OverflowPolicy};
pub use packet::{Packet, PacketHead};
pub use session::Session;

/// Receive buffer ceiling for one inbound packet, head included.
pub const MAX_PACKET_SIZE: usize = 2048;

/// Largest request payload the codec accepts.
pub const MAX_REQUEST_PAYLOAD: usize = MAX_PACKET_SIZE - packet::PacketHead::SIZE;
