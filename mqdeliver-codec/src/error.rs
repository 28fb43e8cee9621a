use std::io;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Packet identifier must not be zero")]
    PacketIdZero,
    #[error("Invalid reason code 0x{0:02X}")]
    InvalidReasonCode(u8),
    #[error("Property 0x{0:02X} is not valid for this packet")]
    InvalidProperty(u8),
    #[error("Property 0x{0:02X} is set twice")]
    DuplicateProperty(u8),
    #[error("Unexpected packet type 0x{0:02X}")]
    UnexpectedPacketType(u8),
    #[error("Unsupported packet type")]
    UnsupportedPacketType,
    #[error("Invalid QoS")]
    InvalidQoS,
    #[error("Max size exceeded")]
    MaxSizeExceeded,
    #[error("utf8 error")]
    Utf8Error,
    #[error("io error, {:?}", _0)]
    Io(io::Error),
}

impl DecodeError {
    /// Protocol violations, as opposed to framing that could not be parsed.
    #[inline]
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            DecodeError::PacketIdZero
                | DecodeError::InvalidReasonCode(_)
                | DecodeError::InvalidProperty(_)
                | DecodeError::DuplicateProperty(_)
        )
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> DecodeError {
        DecodeError::Io(e)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("Packet is bigger than peer's Maximum Packet Size")]
    OverMaxPacketSize,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("Packet id is required")]
    PacketIdRequired,
    #[error("io error, {:?}", _0)]
    Io(io::Error),
}

impl From<io::Error> for EncodeError {
    fn from(e: io::Error) -> EncodeError {
        EncodeError::Io(e)
    }
}
