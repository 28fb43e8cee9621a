use std::io;

use mqdeliver_codec::{DecodeError, EncodeError};

use crate::types::PacketId;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Protocol error, {0}")]
    Protocol(String),
    #[error("Malformed packet, {0}")]
    MalformedPacket(String),
    #[error("Message not found")]
    NotFound,
    #[error("Packet identifier {0} is in use")]
    PacketIdInUse(PacketId),
    #[error("Send queue is full")]
    QueueFull,
    #[error("No packet identifier available")]
    NoPacketIdAvailable,
    #[error("Receive maximum exceeded")]
    ReceiveMaximumExceeded,
    #[error("Not connected")]
    NotConnected,
    #[error("Transport failure, {0}")]
    Transport(#[from] io::Error),
    #[error("Encode error, {0}")]
    Encode(#[from] EncodeError),
    #[error("Storage error, {0}")]
    Storage(#[from] anyhow::Error),
}

impl DeliveryError {
    #[inline]
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        DeliveryError::Protocol(msg.into())
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeliveryError::NotFound)
    }

    /// Errors after which the connection has to be closed.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DeliveryError::NotFound | DeliveryError::QueueFull | DeliveryError::NoPacketIdAvailable)
    }
}

impl From<DecodeError> for DeliveryError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Io(e) => DeliveryError::Transport(e),
            e if e.is_protocol() => DeliveryError::Protocol(e.to_string()),
            e => DeliveryError::MalformedPacket(e.to_string()),
        }
    }
}
