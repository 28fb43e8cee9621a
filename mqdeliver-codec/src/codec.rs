use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::ack::{Ack, AckKind};
use crate::error::{DecodeError, EncodeError};
use crate::publish::Publish;
use crate::reader::PacketReader;
use crate::types::{packet_type, FixedHeader, Protocol, MAX_PACKET_SIZE};
use crate::utils::decode_variable_length;

#[derive(Debug, PartialEq, Eq, Clone)]
/// Packets relevant to reliable delivery. Everything else is handed back raw.
pub enum Packet {
    /// Publish message
    Publish(Box<Publish>),
    /// PUBACK, PUBREC, PUBREL or PUBCOMP
    Ack(AckKind, Ack),
    /// Any other control packet, undecoded
    Other { first_byte: u8, body: Bytes },
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    FrameHeader,
    Frame(FixedHeader),
}

/// Frames packets for one connection.
#[derive(Debug, Clone)]
pub struct Codec {
    protocol: Protocol,
    state: DecodeState,
    max_in_size: u32,
    max_out_size: u32,
}

impl Codec {
    /// Create `Codec` instance
    pub fn new(protocol: Protocol, max_in_size: u32, max_out_size: u32) -> Self {
        Codec { protocol, state: DecodeState::FrameHeader, max_in_size, max_out_size }
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Max inbound frame size, `0` means unlimited.
    #[inline]
    pub fn max_inbound_size(&self) -> u32 {
        self.max_in_size
    }

    #[inline]
    pub fn set_max_inbound_size(&mut self, size: u32) {
        self.max_in_size = size;
    }

    /// Max outbound frame size, `0` means unlimited.
    #[inline]
    pub fn set_max_outbound_size(&mut self, size: u32) {
        self.max_out_size = size;
    }

    fn decode_packet(&self, reader: &mut PacketReader) -> Result<Packet, DecodeError> {
        let first_byte = reader.command();
        match first_byte {
            packet_type::PUBLISH_START..=packet_type::PUBLISH_END => {
                Ok(Packet::Publish(Box::new(Publish::decode(self.protocol, reader)?)))
            }
            _ => match AckKind::from_first_byte(first_byte) {
                Some(kind) => Ok(Packet::Ack(kind, Ack::decode(kind, self.protocol, reader)?)),
                None => Ok(Packet::Other { first_byte, body: reader.take_rest() }),
            },
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(Protocol::default(), 0, 0)
    }
}

impl Decoder for Codec {
    type Item = (Packet, u32);
    type Error = DecodeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        loop {
            match self.state {
                DecodeState::FrameHeader => {
                    if src.len() < 2 {
                        return Ok(None);
                    }
                    let src_slice = src.as_ref();
                    let first_byte = src_slice[0];
                    match decode_variable_length(&src_slice[1..])? {
                        Some((remaining_length, consumed)) => {
                            if self.max_in_size != 0 && self.max_in_size < remaining_length {
                                log::debug!(
                                    "MaxSizeExceeded max-size: {}, remaining: {}",
                                    self.max_in_size,
                                    remaining_length
                                );
                                return Err(DecodeError::MaxSizeExceeded);
                            }
                            src.advance(consumed + 1);
                            self.state = DecodeState::Frame(FixedHeader { first_byte, remaining_length });
                            let remaining_length = remaining_length as usize;
                            if src.len() < remaining_length {
                                src.reserve(remaining_length);
                                return Ok(None);
                            }
                        }
                        None => {
                            return Ok(None);
                        }
                    }
                }
                DecodeState::Frame(fixed) => {
                    if src.len() < fixed.remaining_length as usize {
                        return Ok(None);
                    }
                    let body = src.split_to(fixed.remaining_length as usize).freeze();
                    self.state = DecodeState::FrameHeader;
                    src.reserve(5);
                    let mut reader = PacketReader::new(fixed.first_byte, body);
                    let packet = self.decode_packet(&mut reader)?;
                    return Ok(Some((packet, fixed.remaining_length)));
                }
            }
        }
    }
}

impl Encoder<Packet> for Codec {
    type Error = EncodeError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
        let max_size = if self.max_out_size != 0 { self.max_out_size } else { MAX_PACKET_SIZE };
        let content_size = match &item {
            Packet::Publish(publish) => publish.encoded_size(self.protocol),
            Packet::Ack(_, ack) => ack.encoded_size(self.protocol),
            Packet::Other { .. } => return Err(EncodeError::MalformedPacket),
        };
        if content_size > max_size as usize {
            return Err(EncodeError::OverMaxPacketSize);
        }
        match item {
            Packet::Publish(publish) => publish.encode(self.protocol, dst),
            Packet::Ack(kind, ack) => ack.encode(kind, self.protocol, dst),
            Packet::Other { .. } => Err(EncodeError::MalformedPacket),
        }
    }
}
