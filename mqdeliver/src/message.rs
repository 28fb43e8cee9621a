use std::num::NonZeroU16;
use std::sync::Arc;

use mqdeliver_codec::{Properties, Publish, QoS};

use crate::state::MessageState;
use crate::types::{Direction, PacketId, TimestampMillis};

/// A QoS 1 or QoS 2 message tracked by a store.
///
/// Only the state machine changes `state`; the message itself is immutable
/// once recorded.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    packet_id: NonZeroU16,
    direction: Direction,
    qos: QoS,
    state: MessageState,
    publish: Arc<Publish>,
    retry_count: u32,
    last_send_time: TimestampMillis,
}

impl MessageRecord {
    /// Records `publish` under `packet_id`. The record starts `Queued`; the store
    /// puts it in flight.
    pub fn new(packet_id: NonZeroU16, direction: Direction, mut publish: Publish) -> Self {
        publish.packet_id = Some(packet_id);
        publish.dup = false;
        Self {
            packet_id,
            direction,
            qos: publish.qos,
            state: MessageState::Queued,
            publish: Arc::new(publish),
            retry_count: 0,
            last_send_time: 0,
        }
    }

    #[inline]
    pub fn packet_id(&self) -> NonZeroU16 {
        self.packet_id
    }

    #[inline]
    pub(crate) fn id(&self) -> PacketId {
        self.packet_id.get()
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn qos(&self) -> QoS {
        self.qos
    }

    #[inline]
    pub fn state(&self) -> MessageState {
        self.state
    }

    #[inline]
    pub fn publish(&self) -> &Publish {
        &self.publish
    }

    #[inline]
    pub fn properties(&self) -> &Properties {
        &self.publish.properties
    }

    #[inline]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    #[inline]
    pub fn last_send_time(&self) -> TimestampMillis {
        self.last_send_time
    }

    /// The PUBLISH packet to transmit, flagged as a duplicate on retries.
    #[inline]
    pub fn to_publish(&self, dup: bool) -> Publish {
        let mut publish = self.publish.as_ref().clone();
        publish.dup = dup;
        publish
    }

    #[inline]
    pub(crate) fn set_state(&mut self, state: MessageState) {
        self.state = state;
    }

    #[inline]
    pub(crate) fn touch(&mut self, now: TimestampMillis) {
        self.last_send_time = now;
    }

    #[inline]
    pub(crate) fn mark_retry(&mut self, now: TimestampMillis) {
        self.retry_count += 1;
        self.last_send_time = now;
    }

    #[inline]
    pub fn timeout(&self, interval_millis: TimestampMillis, now: TimestampMillis) -> bool {
        interval_millis > 0 && (now - self.last_send_time) >= interval_millis
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_new() {
        let mut p = Publish::new("a/b", Bytes::from_static(b"x"), QoS::ExactlyOnce);
        p.dup = true;
        let r = MessageRecord::new(NonZeroU16::new(3).unwrap(), Direction::Outgoing, p);
        assert_eq!(r.state(), MessageState::Queued);
        assert_eq!(r.qos(), QoS::ExactlyOnce);
        assert_eq!(r.publish().packet_id, NonZeroU16::new(3));
        assert!(!r.publish().dup);
        assert!(r.to_publish(true).dup);
    }

    #[test]
    fn test_timeout() {
        let p = Publish::new("a", Bytes::new(), QoS::AtLeastOnce);
        let mut r = MessageRecord::new(NonZeroU16::new(1).unwrap(), Direction::Outgoing, p);
        r.touch(1000);
        assert!(!r.timeout(500, 1400));
        assert!(r.timeout(500, 1500));
        assert!(!r.timeout(0, 100_000));
        r.mark_retry(1500);
        assert_eq!(r.retry_count(), 1);
        assert_eq!(r.last_send_time(), 1500);
    }
}
