//! Frame codec for the inbound request stream.
//!
//! The decoder is oblivious to message semantics: it cuts the byte
//! stream into `(head, payload)` pairs and enforces only the receive
//! buffer ceiling. Main-type and message-kind validation belongs to
//! the session dispatcher.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;
use crate::packet::{Packet, PacketHead};
use crate::MAX_REQUEST_PAYLOAD;

/// One undissected message from the wire.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub head: PacketHead,
    pub payload: Bytes,
}

/// Length-delimited packet codec.
///
/// Decodes inbound packets into [`RawRequest`]s; encodes outbound
/// [`Packet`]s (the encoder half is what test clients speak with).
#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = RawRequest;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < PacketHead::SIZE {
            return Ok(None);
        }

        let head = PacketHead::decode(&src[..PacketHead::SIZE])?;
        let length = head.length as usize;
        if length > MAX_REQUEST_PAYLOAD {
            return Err(StreamError::RequestTooLarge {
                size: length,
                max: MAX_REQUEST_PAYLOAD,
            });
        }

        if src.len() < PacketHead::SIZE + length {
            src.reserve(PacketHead::SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(PacketHead::SIZE);
        let payload = src.split_to(length).freeze();
        Ok(Some(RawRequest { head, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item.head.encode());
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}
