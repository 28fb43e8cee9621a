//! MQTT v5 property blocks
//!
//! A property block is a variable byte integer length followed by
//! `(identifier, value)` entries. [`parse_all`] validates each identifier
//! against the packet type it was read from.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, EncodeError};
use crate::reader::PacketReader;
use crate::types::packet_type;
use crate::utils::{decode_variable_length_cursor, var_int_len, write_variable_length, Decode, Encode};

#[inline]
fn unknown_property(_: u8) -> DecodeError {
    DecodeError::MalformedPacket
}

prim_enum! {
    /// MQTT v5 property identifiers
    #[derive(Deserialize, Serialize, PartialOrd, Ord)]
    pub enum PropertyId else unknown_property {
        PayloadFormatIndicator = 0x01,
        MessageExpiryInterval = 0x02,
        ContentType = 0x03,
        ResponseTopic = 0x08,
        CorrelationData = 0x09,
        SubscriptionIdentifier = 0x0B,
        SessionExpiryInterval = 0x11,
        AssignedClientIdentifier = 0x12,
        ServerKeepAlive = 0x13,
        AuthenticationMethod = 0x15,
        AuthenticationData = 0x16,
        RequestProblemInformation = 0x17,
        WillDelayInterval = 0x18,
        RequestResponseInformation = 0x19,
        ResponseInformation = 0x1A,
        ServerReference = 0x1C,
        ReasonString = 0x1F,
        ReceiveMaximum = 0x21,
        TopicAliasMaximum = 0x22,
        TopicAlias = 0x23,
        MaximumQoS = 0x24,
        RetainAvailable = 0x25,
        UserProperty = 0x26,
        MaximumPacketSize = 0x27,
        WildcardSubscriptionAvailable = 0x28,
        SubscriptionIdentifierAvailable = 0x29,
        SharedSubscriptionAvailable = 0x2A
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Byte,
    TwoByteInt,
    FourByteInt,
    VarInt,
    Utf8String,
    Binary,
    StringPair,
}

impl PropertyId {
    fn value_type(self) -> ValueType {
        use PropertyId::*;
        match self {
            PayloadFormatIndicator
            | RequestProblemInformation
            | RequestResponseInformation
            | MaximumQoS
            | RetainAvailable
            | WildcardSubscriptionAvailable
            | SubscriptionIdentifierAvailable
            | SharedSubscriptionAvailable => ValueType::Byte,
            ServerKeepAlive | ReceiveMaximum | TopicAliasMaximum | TopicAlias => ValueType::TwoByteInt,
            MessageExpiryInterval | SessionExpiryInterval | WillDelayInterval | MaximumPacketSize => {
                ValueType::FourByteInt
            }
            SubscriptionIdentifier => ValueType::VarInt,
            ContentType | ResponseTopic | AssignedClientIdentifier | AuthenticationMethod
            | ResponseInformation | ServerReference | ReasonString => ValueType::Utf8String,
            CorrelationData | AuthenticationData => ValueType::Binary,
            UserProperty => ValueType::StringPair,
        }
    }

    #[inline]
    pub fn repeatable(self) -> bool {
        matches!(self, PropertyId::UserProperty | PropertyId::SubscriptionIdentifier)
    }

    /// Whether this property may appear in a packet with the given fixed header byte.
    pub fn allowed_in(self, command: u8) -> bool {
        use PropertyId::*;
        let ptype = command & 0xF0;
        if ptype == packet_type::PUBLISH_START {
            matches!(
                self,
                PayloadFormatIndicator
                    | MessageExpiryInterval
                    | ContentType
                    | ResponseTopic
                    | CorrelationData
                    | SubscriptionIdentifier
                    | TopicAlias
                    | UserProperty
            )
        } else if [packet_type::PUBACK, packet_type::PUBREC, packet_type::PUBREL & 0xF0, packet_type::PUBCOMP]
            .contains(&ptype)
        {
            matches!(self, ReasonString | UserProperty)
        } else {
            false
        }
    }
}

/// Decoded value of a single property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInt(u16),
    FourByteInt(u32),
    VarInt(u32),
    Utf8String(ByteString),
    Binary(Bytes),
    StringPair(ByteString, ByteString),
}

impl PropertyValue {
    fn decode(vt: ValueType, src: &mut Bytes) -> Result<Self, DecodeError> {
        Ok(match vt {
            ValueType::Byte => PropertyValue::Byte(u8::decode(src)?),
            ValueType::TwoByteInt => PropertyValue::TwoByteInt(u16::decode(src)?),
            ValueType::FourByteInt => PropertyValue::FourByteInt(u32::decode(src)?),
            ValueType::VarInt => PropertyValue::VarInt(decode_variable_length_cursor(src)?),
            ValueType::Utf8String => PropertyValue::Utf8String(ByteString::decode(src)?),
            ValueType::Binary => PropertyValue::Binary(Bytes::decode(src)?),
            ValueType::StringPair => {
                let (k, v) = <(ByteString, ByteString)>::decode(src)?;
                PropertyValue::StringPair(k, v)
            }
        })
    }

    fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::Byte(_) => ValueType::Byte,
            PropertyValue::TwoByteInt(_) => ValueType::TwoByteInt,
            PropertyValue::FourByteInt(_) => ValueType::FourByteInt,
            PropertyValue::VarInt(_) => ValueType::VarInt,
            PropertyValue::Utf8String(_) => ValueType::Utf8String,
            PropertyValue::Binary(_) => ValueType::Binary,
            PropertyValue::StringPair(_, _) => ValueType::StringPair,
        }
    }

    fn encoded_size(&self) -> usize {
        match self {
            PropertyValue::Byte(_) => 1,
            PropertyValue::TwoByteInt(_) => 2,
            PropertyValue::FourByteInt(_) => 4,
            PropertyValue::VarInt(v) => var_int_len(*v as usize),
            PropertyValue::Utf8String(s) => s.encoded_size(),
            PropertyValue::Binary(b) => b.encoded_size(),
            PropertyValue::StringPair(k, v) => k.encoded_size() + v.encoded_size(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        match self {
            PropertyValue::Byte(v) => v.encode(buf),
            PropertyValue::TwoByteInt(v) => v.encode(buf),
            PropertyValue::FourByteInt(v) => v.encode(buf),
            PropertyValue::VarInt(v) => write_variable_length(*v, buf),
            PropertyValue::Utf8String(s) => s.encode(buf),
            PropertyValue::Binary(b) => b.encode(buf),
            PropertyValue::StringPair(k, v) => {
                k.encode(buf)?;
                v.encode(buf)
            }
        }
    }
}

/// Ordered property list, as read from or written to the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties(Vec<(PropertyId, PropertyValue)>);

impl Properties {
    #[inline]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &(PropertyId, PropertyValue)> {
        self.0.iter()
    }

    /// First value for `id`.
    #[inline]
    pub fn get(&self, id: PropertyId) -> Option<&PropertyValue> {
        self.0.iter().find(|(pid, _)| *pid == id).map(|(_, v)| v)
    }

    /// Appends a property. The value must match the identifier's wire type.
    pub fn push(&mut self, id: PropertyId, value: PropertyValue) -> Result<(), EncodeError> {
        ensure!(id.value_type() == value.value_type(), EncodeError::MalformedPacket);
        self.0.push((id, value));
        Ok(())
    }

    pub fn reason_string(&self) -> Option<&ByteString> {
        match self.get(PropertyId::ReasonString) {
            Some(PropertyValue::Utf8String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn user_properties(&self) -> impl Iterator<Item = (&ByteString, &ByteString)> {
        self.0.iter().filter_map(|(_, v)| match v {
            PropertyValue::StringPair(k, v) => Some((k, v)),
            _ => None,
        })
    }

    /// Size of the entries, excluding the length prefix.
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(|(_, v)| 1 + v.encoded_size()).sum()
    }

    /// Size of the whole block including the length prefix.
    #[inline]
    pub fn encoded_block_len(&self) -> usize {
        let len = self.encoded_len();
        var_int_len(len) + len
    }

    /// Writes the length prefix followed by all entries.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        let len = u32::try_from(self.encoded_len()).map_err(|_| EncodeError::InvalidLength)?;
        write_variable_length(len, buf)?;
        for (id, value) in self.0.iter() {
            buf.put_u8((*id).into());
            value.encode(buf)?;
        }
        Ok(())
    }

    pub(crate) fn decode(command: u8, src: &mut Bytes) -> Result<Self, DecodeError> {
        let prop_len = decode_variable_length_cursor(src)? as usize;
        ensure!(src.remaining() >= prop_len, DecodeError::MalformedPacket);
        let mut prop_src = src.split_to(prop_len);
        let mut props = Properties::new();
        while prop_src.has_remaining() {
            let raw = prop_src.get_u8();
            let id = PropertyId::try_from(raw)?;
            ensure!(id.allowed_in(command), DecodeError::InvalidProperty(raw));
            ensure!(id.repeatable() || props.get(id).is_none(), DecodeError::DuplicateProperty(raw));
            let value = PropertyValue::decode(id.value_type(), &mut prop_src)?;
            validate(id, &value)?;
            props.0.push((id, value));
        }
        Ok(props)
    }
}

fn validate(id: PropertyId, value: &PropertyValue) -> Result<(), DecodeError> {
    match (id, value) {
        (PropertyId::PayloadFormatIndicator, PropertyValue::Byte(v)) => {
            ensure!(*v <= 1, DecodeError::InvalidProperty(id.into()))
        }
        (PropertyId::TopicAlias, PropertyValue::TwoByteInt(0))
        | (PropertyId::SubscriptionIdentifier, PropertyValue::VarInt(0)) => {
            return Err(DecodeError::InvalidProperty(id.into()))
        }
        _ => {}
    }
    Ok(())
}

/// Reads a complete property block for the packet type `command`.
///
/// Truncated or badly encoded data fails with `MalformedPacket`; a property
/// that is not permitted for `command`, or a non-repeatable property present
/// twice, fails with a protocol error.
#[inline]
pub fn parse_all(command: u8, reader: &mut PacketReader) -> Result<Properties, DecodeError> {
    Properties::decode(command, reader.src_mut())
}
