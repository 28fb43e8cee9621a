use std::num::NonZeroU16;

use bytes::{Buf, Bytes};

use crate::error::DecodeError;
use crate::types::FixedHeader;
use crate::utils::{decode_variable_length, Decode};

/// Cursor over the body of a single packet, positioned after the fixed header.
///
/// `pos()` counts the bytes consumed so far, so a handler can compare it to the
/// declared remaining length once it has read every field it expects.
#[derive(Debug, Clone)]
pub struct PacketReader {
    header: FixedHeader,
    src: Bytes,
}

impl PacketReader {
    #[inline]
    pub fn new(first_byte: u8, body: Bytes) -> Self {
        let header = FixedHeader { first_byte, remaining_length: body.len() as u32 };
        Self { header, src: body }
    }

    /// Parses the fixed header of a complete frame.
    pub fn from_frame(frame: Bytes) -> Result<Self, DecodeError> {
        ensure!(frame.len() >= 2, DecodeError::MalformedPacket);
        let first_byte = frame[0];
        let (remaining_length, consumed) =
            decode_variable_length(&frame[1..])?.ok_or(DecodeError::MalformedPacket)?;
        let body = frame.slice(consumed + 1..);
        ensure!(body.len() == remaining_length as usize, DecodeError::MalformedPacket);
        Ok(Self { header: FixedHeader { first_byte, remaining_length }, src: body })
    }

    #[inline]
    pub fn header(&self) -> FixedHeader {
        self.header
    }

    #[inline]
    pub fn command(&self) -> u8 {
        self.header.first_byte
    }

    #[inline]
    pub fn remaining_length(&self) -> u32 {
        self.header.remaining_length
    }

    #[inline]
    pub fn pos(&self) -> u32 {
        self.header.remaining_length - self.src.remaining() as u32
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.src.remaining()
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        u8::decode(&mut self.src)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        u16::decode(&mut self.src)
    }

    /// Reads a packet identifier that must not be zero.
    #[inline]
    pub fn read_packet_id(&mut self) -> Result<NonZeroU16, DecodeError> {
        NonZeroU16::decode(&mut self.src)
    }

    #[inline]
    pub(crate) fn src_mut(&mut self) -> &mut Bytes {
        &mut self.src
    }

    /// Takes the unread bytes, e.g. a PUBLISH payload.
    #[inline]
    pub fn take_rest(&mut self) -> Bytes {
        self.src.split_off(0)
    }
}
