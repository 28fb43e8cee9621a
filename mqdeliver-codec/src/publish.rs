use std::fmt;
use std::num::NonZeroU16;

use bytes::{BufMut, Bytes, BytesMut};
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::properties::{parse_all, Properties};
use crate::reader::PacketReader;
use crate::types::{packet_type, Protocol, QoS};
use crate::utils::{var_int_len, write_variable_length, Decode, Encode};

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Publish {
    /// this might be re-delivery of an earlier attempt to send the Packet.
    pub dup: bool,
    pub retain: bool,
    /// the level of assurance for delivery of an Application Message.
    pub qos: QoS,
    /// the information channel to which payload data is published.
    pub topic: ByteString,
    /// only present in PUBLISH Packets where the QoS level is 1 or 2.
    pub packet_id: Option<NonZeroU16>,
    /// the Application Message that is being published.
    pub payload: Bytes,

    pub properties: Properties,
}

impl fmt::Debug for Publish {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publish")
            .field("packet_id", &self.packet_id)
            .field("topic", &self.topic)
            .field("dup", &self.dup)
            .field("retain", &self.retain)
            .field("qos", &self.qos)
            .field("payload", &"<REDACTED>")
            .field("properties", &self.properties)
            .finish()
    }
}

impl Publish {
    #[inline]
    pub fn new<T: Into<ByteString>>(topic: T, payload: Bytes, qos: QoS) -> Self {
        Self {
            dup: false,
            retain: false,
            qos,
            topic: topic.into(),
            packet_id: None,
            payload,
            properties: Properties::default(),
        }
    }

    pub fn decode(protocol: Protocol, reader: &mut PacketReader) -> Result<Self, DecodeError> {
        let first_byte = reader.command();
        ensure!(
            (packet_type::PUBLISH_START..=packet_type::PUBLISH_END).contains(&first_byte),
            DecodeError::UnexpectedPacketType(first_byte)
        );
        let flags = first_byte & 0b0000_1111;
        let qos = QoS::try_from((flags & 0b0110) >> 1)?;
        let src = reader.src_mut();
        let topic = ByteString::decode(src)?;
        let packet_id = if qos == QoS::AtMostOnce { None } else { Some(NonZeroU16::decode(src)?) };
        let properties =
            if protocol.is_v5() { parse_all(first_byte, reader)? } else { Properties::default() };

        Ok(Self {
            dup: (flags & 0b1000) == 0b1000,
            retain: (flags & 0b0001) == 0b0001,
            qos,
            topic,
            packet_id,
            payload: reader.take_rest(),
            properties,
        })
    }

    #[inline]
    fn first_byte(&self) -> u8 {
        packet_type::PUBLISH_START | (u8::from(self.qos) << 1) | ((self.dup as u8) << 3) | (self.retain as u8)
    }

    pub fn encoded_size(&self, protocol: Protocol) -> usize {
        let mut size = self.topic.encoded_size() + self.payload.len();
        if self.qos != QoS::AtMostOnce {
            size += 2;
        }
        if protocol.is_v5() {
            size += self.properties.encoded_block_len();
        }
        size
    }

    /// Writes the whole packet, fixed header included.
    pub fn encode(&self, protocol: Protocol, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let size = self.encoded_size(protocol);
        buf.reserve(1 + var_int_len(size) + size);
        buf.put_u8(self.first_byte());
        write_variable_length(u32::try_from(size).map_err(|_| EncodeError::InvalidLength)?, buf)?;
        self.topic.encode(buf)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.ok_or(EncodeError::PacketIdRequired)?.encode(buf)?;
        }
        if protocol.is_v5() {
            self.properties.encode(buf)?;
        }
        buf.extend_from_slice(&self.payload);
        Ok(())
    }
}
