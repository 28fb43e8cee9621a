use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

pub const MQTT_LEVEL_31: u8 = 3;
pub const MQTT_LEVEL_311: u8 = 4;
pub const MQTT_LEVEL_5: u8 = 5;

/// Max possible packet size
pub(crate) const MAX_PACKET_SIZE: u32 = 0xF_FF_FF_FF;

/// Negotiated protocol level of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Protocol(pub u8);

impl Protocol {
    pub const V31: Protocol = Protocol(MQTT_LEVEL_31);
    pub const V311: Protocol = Protocol(MQTT_LEVEL_311);
    pub const V5: Protocol = Protocol(MQTT_LEVEL_5);

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Protocol(MQTT_LEVEL_31) => "MQIsdp",
            Protocol(_) => "MQTT",
        }
    }

    #[inline]
    pub fn level(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_v5(self) -> bool {
        self.0 == MQTT_LEVEL_5
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol(MQTT_LEVEL_311)
    }
}

/// Quality of Service
#[repr(u8)]
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QoS {
    /// At most once delivery
    ///
    /// No response is sent by the receiver and no retry is performed by the sender.
    AtMostOnce = 0,
    /// At least once delivery
    ///
    /// A QoS 1 PUBLISH Packet has a Packet Identifier in its variable header
    /// and is acknowledged by a PUBACK Packet.
    AtLeastOnce = 1,
    /// Exactly once delivery
    ///
    /// Acknowledged by the PUBREC, PUBREL, PUBCOMP handshake.
    ExactlyOnce = 2,
}

impl QoS {
    #[inline]
    pub fn value(&self) -> u8 {
        *self as u8
    }

    #[inline]
    pub fn less_value(&self, qos: QoS) -> QoS {
        if self.value() < qos.value() {
            *self
        } else {
            qos
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}

impl From<QoS> for u8 {
    fn from(v: QoS) -> Self {
        v.value()
    }
}

pub mod packet_type {
    pub const PUBLISH_START: u8 = 0b0011_0000;
    pub const PUBLISH_END: u8 = 0b0011_1111;
    pub const PUBACK: u8 = 0b0100_0000;
    pub const PUBREC: u8 = 0b0101_0000;
    pub const PUBREL: u8 = 0b0110_0010;
    pub const PUBCOMP: u8 = 0b0111_0000;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FixedHeader {
    /// Fixed Header byte
    pub first_byte: u8,
    /// the number of bytes remaining within the current packet,
    /// including data in the variable header and the payload.
    pub remaining_length: u32,
}

impl FixedHeader {
    #[inline]
    pub fn packet_type(&self) -> u8 {
        self.first_byte & 0xF0
    }
}

pub type TimestampMillis = i64;
