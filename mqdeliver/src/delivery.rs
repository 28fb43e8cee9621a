use std::num::NonZeroU16;

use mqdeliver_codec::ack::{RC_PACKET_ID_NOT_FOUND, RC_SUCCESS};
use mqdeliver_codec::types::packet_type;
use mqdeliver_codec::{Ack, AckKind, PacketReader, Properties, Publish, QoS};

use crate::message::MessageRecord;
use crate::session::Session;
use crate::state::{Event, MessageState};
use crate::types::{ConnectionState, Direction, RoleKind, TimestampMillis};
use crate::utils::timestamp_millis;
use crate::{DeliveryError, Result};

const PUBREL_TYPE: u8 = packet_type::PUBREL & 0xF0;

impl Session {
    /// Dispatches one received packet to its handler.
    pub fn handle_packet(&self, reader: &mut PacketReader) -> Result<()> {
        match reader.command() & 0xF0 {
            packet_type::PUBLISH_START => self.handle_publish(reader),
            packet_type::PUBACK => self.handle_puback(reader),
            packet_type::PUBREC => self.handle_pubrec(reader),
            PUBREL_TYPE => self.handle_pubrel(reader),
            packet_type::PUBCOMP => self.handle_pubcomp(reader),
            _ => Err(DeliveryError::protocol(format!("unexpected packet type 0x{:02X}", reader.command()))),
        }
    }

    /// PUBREC, the peer received our QoS 2 PUBLISH.
    ///
    /// A success reason code moves the message to `WaitForPubcomp` and is
    /// answered with PUBREL. A failure reason code ends the message without a
    /// PUBREL. An unknown packet identifier is logged; on the success path the
    /// PUBREL is still sent so that the peer can finish its side.
    pub fn handle_pubrec(&self, reader: &mut PacketReader) -> Result<()> {
        self.ensure_active()?;
        let ack = Ack::decode(AckKind::PubRec, self.protocol(), reader)?;
        let packet_id = ack.packet_id;
        match self.role.kind() {
            RoleKind::Broker => {
                log::debug!("Received PUBREC from {} (Mid: {}, RC:{})", self.id(), packet_id, ack.reason_code)
            }
            RoleKind::Client => {
                log::debug!("Client {} received PUBREC (Mid: {}, RC:{})", self.id(), packet_id, ack.reason_code)
            }
        }

        let success = self.role.gate().is_success(ack.reason_code, self.protocol());
        match self.role.advance(self, Direction::Outgoing, Event::new(AckKind::PubRec, &ack)) {
            Ok(advance) => {
                self.send_released(advance.released)?;
                if advance.outcome.is_complete() {
                    return Ok(());
                }
            }
            Err(DeliveryError::NotFound) => {
                log::warn!("Received PUBREC from {} for an unknown packet identifier (Mid: {})", self.id(), packet_id);
                if !success {
                    return Ok(());
                }
            }
            Err(e) => return Err(e),
        }

        self.sender.send_pubrel(self.id(), packet_id, Properties::default())
    }

    /// PUBACK, the peer settled our QoS 1 PUBLISH.
    pub fn handle_puback(&self, reader: &mut PacketReader) -> Result<()> {
        self.ensure_active()?;
        let ack = Ack::decode(AckKind::PubAck, self.protocol(), reader)?;
        log::debug!("{} received PUBACK (Mid: {}, RC:{})", self.id(), ack.packet_id, ack.reason_code);
        self.settle(AckKind::PubAck, &ack)
    }

    /// PUBCOMP, the last packet of an outgoing QoS 2 handshake.
    pub fn handle_pubcomp(&self, reader: &mut PacketReader) -> Result<()> {
        self.ensure_active()?;
        let ack = Ack::decode(AckKind::PubComp, self.protocol(), reader)?;
        log::debug!("{} received PUBCOMP (Mid: {}, RC:{})", self.id(), ack.packet_id, ack.reason_code);
        self.settle(AckKind::PubComp, &ack)
    }

    /// PUBREL, the peer releases a QoS 2 message it sent us. The message is
    /// delivered now and answered with PUBCOMP.
    pub fn handle_pubrel(&self, reader: &mut PacketReader) -> Result<()> {
        self.ensure_active()?;
        let ack = Ack::decode(AckKind::PubRel, self.protocol(), reader)?;
        log::debug!("{} received PUBREL (Mid: {})", self.id(), ack.packet_id);

        let reason_code = match self.role.advance(self, Direction::Incoming, Event::new(AckKind::PubRel, &ack)) {
            Ok(advance) => {
                if let Some(record) = advance.record {
                    self.role.deliver(self, record.publish());
                }
                RC_SUCCESS
            }
            Err(DeliveryError::NotFound) => {
                log::warn!("Received PUBREL from {} for an unknown packet identifier (Mid: {})", self.id(), ack.packet_id);
                RC_PACKET_ID_NOT_FOUND
            }
            Err(e) => return Err(e),
        };
        self.sender.send_pubcomp(self.id(), ack.packet_id, reason_code)
    }

    /// PUBLISH from the peer.
    pub fn handle_publish(&self, reader: &mut PacketReader) -> Result<()> {
        self.ensure_active()?;
        let publish = Publish::decode(self.protocol(), reader)?;
        log::debug!(
            "{} received PUBLISH (d{}, q{}, r{}, m{}, '{}', ... ({} bytes))",
            self.id(),
            publish.dup as u8,
            publish.qos.value(),
            publish.retain as u8,
            publish.packet_id.map(|id| id.get()).unwrap_or_default(),
            publish.topic,
            publish.payload.len()
        );

        match (publish.qos, publish.packet_id) {
            (QoS::AtMostOnce, _) => {
                self.role.deliver(self, &publish);
                Ok(())
            }
            (QoS::AtLeastOnce, Some(packet_id)) => {
                self.role.deliver(self, &publish);
                self.sender.send_puback(self.id(), packet_id, RC_SUCCESS)
            }
            (QoS::ExactlyOnce, Some(packet_id)) => {
                if !self.role.store_incoming(self, publish)? {
                    log::debug!("{} duplicate PUBLISH (Mid: {}), PUBREC resent", self.id(), packet_id);
                }
                self.sender.send_pubrec(self.id(), packet_id, RC_SUCCESS)
            }
            (_, None) => Err(DeliveryError::protocol("packet identifier missing")),
        }
    }

    /// Publishes a message to the peer. QoS 1 and 2 messages are tracked until
    /// acknowledged and queued while the send quota is exhausted; their packet
    /// identifier is returned.
    pub fn publish(&self, mut publish: Publish) -> Result<Option<NonZeroU16>> {
        if publish.qos == QoS::AtMostOnce {
            if !self.is_active() {
                return Err(DeliveryError::NotConnected);
            }
            publish.packet_id = None;
            publish.dup = false;
            self.sender.send_publish(self.id(), publish)?;
            return Ok(None);
        }

        let (packet_id, sent) = self.role.store_outgoing(self, publish)?;
        match sent {
            Some(record) if self.is_active() => self.sender.send_publish(self.id(), record.to_publish(false))?,
            Some(_) => log::debug!("{} not connected, message (Mid: {}) is sent on resume", self.id(), packet_id),
            None => log::debug!("{} send quota exhausted, message (Mid: {}) queued", self.id(), packet_id),
        }
        Ok(Some(packet_id))
    }

    /// Retransmits outgoing messages unacknowledged for the retry interval.
    #[inline]
    pub fn retry(&self) -> Result<usize> {
        self.retry_at(timestamp_millis())
    }

    pub fn retry_at(&self, now: TimestampMillis) -> Result<usize> {
        if !self.is_active() {
            return Ok(0);
        }
        let records = self.role.due_for_retry(self, self.retry_interval(), now)?;
        for record in records.iter() {
            log::debug!(
                "{} resending (Mid: {}, state: {:?}, retries: {})",
                self.id(),
                record.packet_id(),
                record.state(),
                record.retry_count()
            );
            self.resend(record)?;
        }
        Ok(records.len())
    }

    /// Marks the connection active and retransmits every outgoing message still
    /// in flight, as required after a reconnect.
    pub fn resume(&self) -> Result<usize> {
        self.set_state(ConnectionState::Active);
        let records = self.role.inflight(self, Direction::Outgoing)?;
        for record in records.iter() {
            self.resend(record)?;
        }
        Ok(records.len())
    }

    /// Applies the Receive Maximum the peer announced for this connection and
    /// sends whatever the larger quota lets in flight.
    pub fn set_receive_maximum(&self, receive_maximum: u16) -> Result<()> {
        let released = self.role.set_receive_maximum(self, receive_maximum)?;
        self.send_released(released)
    }

    /// Ends the connection. A clean session also drops its records.
    pub fn close(&self, clean_session: bool) -> Result<usize> {
        self.set_state(ConnectionState::Disconnected);
        if clean_session {
            self.role.clear(self)
        } else {
            Ok(0)
        }
    }

    #[inline]
    pub fn inflight(&self, direction: Direction) -> Result<Vec<MessageRecord>> {
        self.role.inflight(self, direction)
    }

    fn resend(&self, record: &MessageRecord) -> Result<()> {
        match record.state() {
            MessageState::WaitForPuback | MessageState::WaitForPubrec => {
                self.sender.send_publish(self.id(), record.to_publish(true))
            }
            MessageState::WaitForPubcomp => {
                self.sender.send_pubrel(self.id(), record.packet_id(), Properties::default())
            }
            MessageState::WaitForPubrel => self.sender.send_pubrec(self.id(), record.packet_id(), RC_SUCCESS),
            MessageState::Queued => Ok(()),
        }
    }

    fn settle(&self, kind: AckKind, ack: &Ack) -> Result<()> {
        match self.role.advance(self, Direction::Outgoing, Event::new(kind, ack)) {
            Ok(advance) => self.send_released(advance.released),
            Err(DeliveryError::NotFound) => {
                log::warn!(
                    "Received {} from {} for an unknown packet identifier (Mid: {})",
                    kind.name(),
                    self.id(),
                    ack.packet_id
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn send_released(&self, released: Vec<MessageRecord>) -> Result<()> {
        if !self.is_active() {
            return Ok(());
        }
        for record in released {
            self.sender.send_publish(self.id(), record.to_publish(false))?;
        }
        Ok(())
    }

    #[inline]
    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(DeliveryError::protocol(format!("connection is {:?}", self.state())))
        }
    }
}
