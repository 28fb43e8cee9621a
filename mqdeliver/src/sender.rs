use std::io;
use std::num::NonZeroU16;

use bytes::BytesMut;
use mqdeliver_codec::{Ack, AckKind, Codec, Packet, Properties, Protocol, Publish};
use parking_lot::Mutex;
use tokio_util::codec::Encoder;

use crate::types::ClientId;
use crate::Result;

/// Outbound side of a connection.
///
/// Implementations must not call back into the session; the delivery
/// handlers never hold a store lock while sending.
pub trait PacketSender: Send + Sync {
    fn send(&self, id: &ClientId, packet: Packet) -> Result<()>;

    #[inline]
    fn send_publish(&self, id: &ClientId, publish: Publish) -> Result<()> {
        self.send(id, Packet::Publish(Box::new(publish)))
    }

    #[inline]
    fn send_puback(&self, id: &ClientId, packet_id: NonZeroU16, reason_code: u8) -> Result<()> {
        self.send(id, Packet::Ack(AckKind::PubAck, Ack::with_reason(packet_id, reason_code)))
    }

    #[inline]
    fn send_pubrec(&self, id: &ClientId, packet_id: NonZeroU16, reason_code: u8) -> Result<()> {
        self.send(id, Packet::Ack(AckKind::PubRec, Ack::with_reason(packet_id, reason_code)))
    }

    #[inline]
    fn send_pubrel(&self, id: &ClientId, packet_id: NonZeroU16, properties: Properties) -> Result<()> {
        let mut ack = Ack::new(packet_id);
        ack.properties = properties;
        self.send(id, Packet::Ack(AckKind::PubRel, ack))
    }

    #[inline]
    fn send_pubcomp(&self, id: &ClientId, packet_id: NonZeroU16, reason_code: u8) -> Result<()> {
        self.send(id, Packet::Ack(AckKind::PubComp, Ack::with_reason(packet_id, reason_code)))
    }
}

struct Framed<W> {
    codec: Codec,
    io: W,
    buf: BytesMut,
}

/// Encodes packets with [`Codec`] and writes each one to `W` as a whole.
pub struct FramedSender<W> {
    inner: Mutex<Framed<W>>,
}

impl<W> FramedSender<W>
where
    W: io::Write + Send,
{
    #[inline]
    pub fn new(protocol: Protocol, io: W) -> Self {
        Self::with_codec(Codec::new(protocol, 0, 0), io)
    }

    #[inline]
    pub fn with_codec(codec: Codec, io: W) -> Self {
        Self { inner: Mutex::new(Framed { codec, io, buf: BytesMut::with_capacity(64) }) }
    }

    #[inline]
    pub fn protocol(&self) -> Protocol {
        self.inner.lock().codec.protocol()
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner().io
    }
}

impl<W> PacketSender for FramedSender<W>
where
    W: io::Write + Send,
{
    fn send(&self, id: &ClientId, packet: Packet) -> Result<()> {
        let mut inner = self.inner.lock();
        let Framed { codec, io, buf } = &mut *inner;
        buf.clear();
        codec.encode(packet, buf)?;
        io.write_all(buf)?;
        io.flush()?;
        log::trace!("{} sent {} bytes", id, buf.len());
        Ok(())
    }
}
