use std::num::NonZeroU16;

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::properties::{parse_all, Properties};
use crate::reader::PacketReader;
use crate::types::{packet_type, Protocol};
use crate::utils::{var_int_len, write_variable_length, Encode};

/// Acknowledgment packet types of the QoS 1 and QoS 2 handshakes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckKind {
    PubAck,
    PubRec,
    PubRel,
    PubComp,
}

impl AckKind {
    /// Fixed header byte, including the reserved flags PUBREL requires.
    #[inline]
    pub fn first_byte(self) -> u8 {
        match self {
            AckKind::PubAck => packet_type::PUBACK,
            AckKind::PubRec => packet_type::PUBREC,
            AckKind::PubRel => packet_type::PUBREL,
            AckKind::PubComp => packet_type::PUBCOMP,
        }
    }

    #[inline]
    pub fn from_first_byte(first_byte: u8) -> Option<AckKind> {
        match first_byte {
            packet_type::PUBACK => Some(AckKind::PubAck),
            packet_type::PUBREC => Some(AckKind::PubRec),
            packet_type::PUBREL => Some(AckKind::PubRel),
            packet_type::PUBCOMP => Some(AckKind::PubComp),
            _ => None,
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            AckKind::PubAck => "PUBACK",
            AckKind::PubRec => "PUBREC",
            AckKind::PubRel => "PUBREL",
            AckKind::PubComp => "PUBCOMP",
        }
    }

    /// Reason codes a peer may legally send in this packet type.
    pub fn allows_reason(self, code: u8) -> bool {
        match self {
            AckKind::PubAck | AckKind::PubRec => PublishAckReason::try_from(code).is_ok(),
            AckKind::PubRel | AckKind::PubComp => PublishAck2Reason::try_from(code).is_ok(),
        }
    }
}

prim_enum! {
    /// PUBACK / PUBREC reason codes
    #[derive(Deserialize, Serialize)]
    pub enum PublishAckReason else DecodeError::InvalidReasonCode {
        Success = 0x00,
        NoMatchingSubscribers = 0x10,
        UnspecifiedError = 0x80,
        ImplementationSpecificError = 0x83,
        NotAuthorized = 0x87,
        TopicNameInvalid = 0x90,
        PacketIdentifierInUse = 0x91,
        QuotaExceeded = 0x97,
        PayloadFormatInvalid = 0x99
    }
}

prim_enum! {
    /// PUBREL / PUBCOMP reason codes
    #[derive(Deserialize, Serialize)]
    pub enum PublishAck2Reason else DecodeError::InvalidReasonCode {
        Success = 0x00,
        PacketIdNotFound = 0x92
    }
}

pub const RC_SUCCESS: u8 = 0x00;
pub const RC_PACKET_ID_NOT_FOUND: u8 = 0x92;

/// Reason codes at or above this value report a failure.
pub const RC_ERROR_THRESHOLD: u8 = 0x80;

/// Decoded PUBACK/PUBREC/PUBREL/PUBCOMP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Packet Identifier
    pub packet_id: NonZeroU16,
    /// Raw reason code, `0` when the packet carried none
    pub reason_code: u8,
    pub properties: Properties,
}

impl Ack {
    #[inline]
    pub fn new(packet_id: NonZeroU16) -> Self {
        Self { packet_id, reason_code: RC_SUCCESS, properties: Properties::default() }
    }

    #[inline]
    pub fn with_reason(packet_id: NonZeroU16, reason_code: u8) -> Self {
        Self { packet_id, reason_code, properties: Properties::default() }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.reason_code >= RC_ERROR_THRESHOLD
    }

    /// Decodes the body of an acknowledgment packet.
    ///
    /// The reason code is read only for v5 connections whose remaining length is
    /// greater than 2, and the property block only when it is greater than 3. Any
    /// bytes left before the declared remaining length is reached make the packet
    /// malformed; the parsed properties are dropped on that path.
    pub fn decode(kind: AckKind, protocol: Protocol, reader: &mut PacketReader) -> Result<Self, DecodeError> {
        ensure!(reader.command() == kind.first_byte(), DecodeError::UnexpectedPacketType(reader.command()));

        let packet_id = reader.read_packet_id()?;
        let mut reason_code = RC_SUCCESS;
        let mut properties = Properties::default();

        if protocol.is_v5() && reader.remaining_length() > 2 {
            reason_code = reader.read_u8()?;
            ensure!(kind.allows_reason(reason_code), DecodeError::InvalidReasonCode(reason_code));

            if reader.remaining_length() > 3 {
                properties = parse_all(kind.first_byte(), reader)?;
            }
        }

        if reader.pos() < reader.remaining_length() {
            drop(properties);
            return Err(DecodeError::MalformedPacket);
        }

        Ok(Self { packet_id, reason_code, properties })
    }

    /// Size of the variable header for `protocol`.
    pub fn encoded_size(&self, protocol: Protocol) -> usize {
        if !protocol.is_v5() || (self.reason_code == RC_SUCCESS && self.properties.is_empty()) {
            2
        } else if self.properties.is_empty() {
            3
        } else {
            3 + self.properties.encoded_block_len()
        }
    }

    /// Writes the whole packet, fixed header included.
    pub fn encode(&self, kind: AckKind, protocol: Protocol, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let size = self.encoded_size(protocol);
        buf.reserve(1 + var_int_len(size) + size);
        buf.put_u8(kind.first_byte());
        write_variable_length(size as u32, buf)?;
        self.packet_id.encode(buf)?;
        if size > 2 {
            buf.put_u8(self.reason_code);
            if size > 3 {
                self.properties.encode(buf)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use test_case::test_case;

    use super::*;
    use crate::properties::{PropertyId, PropertyValue};

    fn reader(first_byte: u8, body: &'static [u8]) -> PacketReader {
        PacketReader::new(first_byte, Bytes::from_static(body))
    }

    #[test_case(b"\x00\x07", Protocol::V311, 7, 0x00; "v3_plain")]
    #[test_case(b"\x00\x2A", Protocol::V5, 42, 0x00; "v5_short_form")]
    #[test_case(b"\x00\x2A\x97", Protocol::V5, 42, 0x97; "v5_quota_exceeded")]
    #[test_case(b"\x00\x2A\x10\x00", Protocol::V5, 42, 0x10; "v5_no_matching_empty_props")]
    #[test_case(b"\xFF\xFF\x80\x06\x1F\x00\x03abc", Protocol::V5, 65535, 0x80; "v5_reason_string")]
    fn pubrec_decode_success(input: &'static [u8], protocol: Protocol, packet_id: u16, reason_code: u8) {
        let mut r = reader(packet_type::PUBREC, input);
        let ack = Ack::decode(AckKind::PubRec, protocol, &mut r).unwrap();
        assert_eq!(ack.packet_id.get(), packet_id);
        assert_eq!(ack.reason_code, reason_code);
        assert_eq!(r.remaining(), 0);
    }

    #[test_case(b"\x00\x00", Protocol::V311; "zero_id_v3")]
    #[test_case(b"\x00\x00\x00", Protocol::V5; "zero_id_v5")]
    #[test_case(b"\x00\x00\x97", Protocol::V5; "zero_id_with_reason")]
    #[test_case(b"\x00\x01\x05", Protocol::V5; "reason_not_allowed")]
    #[test_case(b"\x00\x01\x92", Protocol::V5; "pubrel_reason_in_pubrec")]
    #[test_case(b"\x00\x01\x00\x02\x23\x00", Protocol::V5; "property_not_allowed")]
    fn pubrec_decode_protocol_error(input: &'static [u8], protocol: Protocol) {
        let mut r = reader(packet_type::PUBREC, input);
        let err = Ack::decode(AckKind::PubRec, protocol, &mut r).unwrap_err();
        assert!(err.is_protocol(), "{:?}", err);
    }

    #[test_case(b"\x00\x01\x00", Protocol::V311; "v3_trailing_byte")]
    #[test_case(b"\x00", Protocol::V5; "truncated_id")]
    #[test_case(b"\x00\x01\x00\x80", Protocol::V5; "invalid_varint")]
    #[test_case(b"\x00\x01\x00\x00\xAA", Protocol::V5; "trailing_after_props")]
    #[test_case(b"\x00\x01\x00\x04\x1F\x00\x05a", Protocol::V5; "truncated_property")]
    fn pubrec_decode_malformed(input: &'static [u8], protocol: Protocol) {
        let mut r = reader(packet_type::PUBREC, input);
        let err = Ack::decode(AckKind::PubRec, protocol, &mut r).unwrap_err();
        assert!(!err.is_protocol(), "{:?}", err);
    }

    #[test]
    fn test_wrong_command() {
        let mut r = reader(packet_type::PUBACK, b"\x00\x01");
        assert!(matches!(
            Ack::decode(AckKind::PubRec, Protocol::V5, &mut r),
            Err(DecodeError::UnexpectedPacketType(0x40))
        ));
    }

    #[test]
    fn test_pubrel_pubcomp_reasons() {
        assert!(AckKind::PubRel.allows_reason(0x92));
        assert!(!AckKind::PubRel.allows_reason(0x97));
        assert!(AckKind::PubComp.allows_reason(0x00));
        assert!(AckKind::PubAck.allows_reason(0x99));
        assert!(!AckKind::PubAck.allows_reason(0x92));
        let mut r = reader(packet_type::PUBREL, b"\x00\x03\x92");
        let ack = Ack::decode(AckKind::PubRel, Protocol::V5, &mut r).unwrap();
        assert_eq!(ack.reason_code, RC_PACKET_ID_NOT_FOUND);
    }

    #[test]
    fn test_encode_forms() {
        let id = NonZeroU16::new(7).unwrap();
        let mut buf = BytesMut::new();
        Ack::new(id).encode(AckKind::PubRel, Protocol::V311, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x62\x02\x00\x07");

        buf.clear();
        Ack::new(id).encode(AckKind::PubRel, Protocol::V5, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x62\x02\x00\x07");

        buf.clear();
        Ack::with_reason(id, 0x92).encode(AckKind::PubComp, Protocol::V5, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x70\x03\x00\x07\x92");

        // v3 never carries a reason code
        buf.clear();
        Ack::with_reason(id, 0x92).encode(AckKind::PubComp, Protocol::V311, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"\x70\x02\x00\x07");
    }

    #[test]
    fn test_encode_decode_with_properties() {
        let mut ack = Ack::with_reason(NonZeroU16::new(300).unwrap(), 0x87);
        ack.properties.push(PropertyId::ReasonString, PropertyValue::Utf8String("denied".into())).unwrap();
        let mut buf = BytesMut::new();
        ack.encode(AckKind::PubRec, Protocol::V5, &mut buf).unwrap();

        let mut r = PacketReader::from_frame(buf.freeze()).unwrap();
        let decoded = Ack::decode(AckKind::PubRec, Protocol::V5, &mut r).unwrap();
        assert_eq!(decoded, ack);
        assert!(decoded.is_error());
    }
}
