use std::collections::VecDeque;
use std::num::NonZeroU16;

use itertools::Itertools;
use rust_box::dequemap::DequeBTreeMap as DequeMap;

use crate::message::MessageRecord;
use crate::quota::SendQuota;
use crate::state::MessageState;
use crate::types::{Direction, Limits, PacketId, TimestampMillis};
use crate::utils::timestamp_millis;
use crate::{DeliveryError, Result};

type Inflights = DequeMap<PacketId, MessageRecord>;

/// The messages of one direction of one session.
///
/// In-flight records are kept in transmission order. Outgoing messages that
/// find no free quota slot wait in a FIFO and are promoted by
/// [`MessageStore::release_to_inflight`] as slots come back.
pub struct MessageStore {
    direction: Direction,
    inflight: Inflights,
    queued: VecDeque<(MessageState, MessageRecord)>,
    quota: SendQuota,
    max_queued: usize,
    next: u16,
}

impl MessageStore {
    #[inline]
    pub fn new(direction: Direction, limits: Limits) -> Self {
        Self {
            direction,
            inflight: Inflights::default(),
            queued: VecDeque::new(),
            quota: SendQuota::new(limits.receive_maximum),
            max_queued: limits.max_queued,
            next: 1,
        }
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn lookup(&self, packet_id: PacketId) -> Option<&MessageRecord> {
        self.inflight.get(&packet_id)
    }

    /// Whether `packet_id` is held by an in-flight or a queued record.
    #[inline]
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.inflight.contains_key(&packet_id) || self.queued.iter().any(|(_, r)| r.id() == packet_id)
    }

    /// Stores `record`. Returns a copy of it when it went straight in flight and
    /// has to be transmitted now, `None` when it was queued.
    pub fn insert(&mut self, mut record: MessageRecord) -> Result<Option<MessageRecord>> {
        let state = MessageState::initial(self.direction, record.qos()).ok_or_else(|| {
            DeliveryError::protocol(format!("{:?} messages are not tracked", record.qos()))
        })?;
        if self.contains(record.id()) {
            return Err(DeliveryError::PacketIdInUse(record.id()));
        }

        match self.direction {
            Direction::Outgoing if self.queued.is_empty() && self.quota.try_acquire() => {
                Ok(Some(self.put_inflight(state, record, timestamp_millis())))
            }
            Direction::Outgoing => {
                if self.max_queued > 0 && self.queued.len() >= self.max_queued {
                    return Err(DeliveryError::QueueFull);
                }
                record.set_state(MessageState::Queued);
                self.queued.push_back((state, record));
                Ok(None)
            }
            Direction::Incoming => {
                if !self.quota.try_acquire() {
                    return Err(DeliveryError::ReceiveMaximumExceeded);
                }
                Ok(Some(self.put_inflight(state, record, timestamp_millis())))
            }
        }
    }

    #[inline]
    fn put_inflight(&mut self, state: MessageState, mut record: MessageRecord, now: TimestampMillis) -> MessageRecord {
        record.set_state(state);
        record.touch(now);
        let copy = record.clone();
        self.inflight.insert(record.id(), record);
        copy
    }

    pub(crate) fn set_state(&mut self, packet_id: PacketId, state: MessageState) -> Result<()> {
        let record = self.inflight.get_mut(&packet_id).ok_or(DeliveryError::NotFound)?;
        record.set_state(state);
        record.touch(timestamp_millis());
        Ok(())
    }

    /// Takes an in-flight record out of the store. Its identifier is free again
    /// afterwards; the quota slot is returned separately.
    #[inline]
    pub fn remove(&mut self, packet_id: PacketId) -> Option<MessageRecord> {
        self.inflight.remove(&packet_id)
    }

    #[inline]
    pub fn quota(&self) -> &SendQuota {
        &self.quota
    }

    #[inline]
    pub fn quota_mut(&mut self) -> &mut SendQuota {
        &mut self.quota
    }

    /// Moves queued records in flight while quota is available, oldest first.
    /// Returns the promoted records, which the caller transmits.
    pub fn release_to_inflight(&mut self) -> Vec<MessageRecord> {
        let now = timestamp_millis();
        let mut released = Vec::new();
        while !self.queued.is_empty() && self.quota.try_acquire() {
            if let Some((state, record)) = self.queued.pop_front() {
                released.push(self.put_inflight(state, record, now));
            }
        }
        if !released.is_empty() {
            log::debug!("{} queued {} message(s) released to inflight", released.len(), self.direction.as_str());
        }
        released
    }

    /// Allocates an identifier not held by any record of this store.
    pub fn next_id(&mut self) -> Result<NonZeroU16> {
        for _ in 0..=u16::MAX {
            let id = self.next;
            self.next = self.next.wrapping_add(1);
            if let Some(id) = NonZeroU16::new(id) {
                if !self.contains(id.get()) {
                    return Ok(id);
                }
            }
        }
        Err(DeliveryError::NoPacketIdAvailable)
    }

    /// In-flight records unacknowledged for at least `interval_millis`. Their retry
    /// counters and send times are updated as they are handed out.
    pub fn due_for_retry(&mut self, interval_millis: TimestampMillis, now: TimestampMillis) -> Vec<MessageRecord> {
        let ids = self
            .inflight
            .iter()
            .filter(|(_, r)| r.timeout(interval_millis, now))
            .map(|(id, _)| *id)
            .collect_vec();
        ids.into_iter()
            .filter_map(|id| {
                self.inflight.get_mut(&id).map(|r| {
                    r.mark_retry(now);
                    r.clone()
                })
            })
            .collect()
    }

    #[inline]
    pub fn inflight(&self) -> Vec<MessageRecord> {
        self.inflight.iter().map(|(_, r)| r.clone()).collect_vec()
    }

    #[inline]
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    #[inline]
    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty() && self.queued.is_empty()
    }

    /// Drops every record and gives all quota back.
    pub fn clear(&mut self) -> usize {
        let n = self.inflight.len() + self.queued.len();
        self.inflight = Inflights::default();
        self.queued.clear();
        self.quota = SendQuota::new(self.quota.maximum());
        n
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use mqdeliver_codec::{Publish, QoS};

    use super::*;

    fn record(id: u16, direction: Direction, qos: QoS) -> MessageRecord {
        let publish = Publish::new("t", Bytes::from_static(b"p"), qos);
        MessageRecord::new(NonZeroU16::new(id).unwrap(), direction, publish)
    }

    fn outgoing(receive_maximum: u16, max_queued: usize) -> MessageStore {
        MessageStore::new(Direction::Outgoing, Limits::new(receive_maximum, max_queued))
    }

    #[test]
    fn test_insert_inflight_then_queue() {
        let mut s = outgoing(1, 10);
        let r = s.insert(record(1, Direction::Outgoing, QoS::ExactlyOnce)).unwrap().unwrap();
        assert_eq!(r.state(), MessageState::WaitForPubrec);
        assert!(s.insert(record(2, Direction::Outgoing, QoS::AtLeastOnce)).unwrap().is_none());
        assert_eq!(s.inflight_len(), 1);
        assert_eq!(s.queued_len(), 1);
        assert!(s.lookup(2).is_none());
        assert!(s.contains(2));
    }

    #[test]
    fn test_packet_id_in_use() {
        let mut s = outgoing(1, 10);
        s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        s.insert(record(2, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        assert!(matches!(
            s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)),
            Err(DeliveryError::PacketIdInUse(1))
        ));
        assert!(matches!(
            s.insert(record(2, Direction::Outgoing, QoS::AtLeastOnce)),
            Err(DeliveryError::PacketIdInUse(2))
        ));
    }

    #[test]
    fn test_queue_full() {
        let mut s = outgoing(1, 1);
        s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        s.insert(record(2, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        assert!(matches!(s.insert(record(3, Direction::Outgoing, QoS::AtLeastOnce)), Err(DeliveryError::QueueFull)));
    }

    #[test]
    fn test_qos0_not_tracked() {
        let mut s = outgoing(1, 1);
        assert!(matches!(s.insert(record(1, Direction::Outgoing, QoS::AtMostOnce)), Err(DeliveryError::Protocol(_))));
        let mut s = MessageStore::new(Direction::Incoming, Limits::default());
        assert!(matches!(s.insert(record(1, Direction::Incoming, QoS::AtLeastOnce)), Err(DeliveryError::Protocol(_))));
    }

    #[test]
    fn test_release_in_order() {
        let mut s = outgoing(2, 10);
        for id in 1..=5 {
            s.insert(record(id, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        }
        assert!(s.release_to_inflight().is_empty());

        assert!(s.remove(1).is_some());
        assert!(s.remove(2).is_some());
        s.quota_mut().increment();
        s.quota_mut().increment();
        let released = s.release_to_inflight();
        assert_eq!(released.iter().map(|r| r.id()).collect_vec(), vec![3, 4]);
        assert!(released.iter().all(|r| r.state() == MessageState::WaitForPuback));
        assert_eq!(s.quota().available(), 0);
        assert_eq!(s.queued_len(), 1);
    }

    #[test]
    fn test_incoming_receive_maximum() {
        let mut s = MessageStore::new(Direction::Incoming, Limits::new(1, 0));
        let r = s.insert(record(9, Direction::Incoming, QoS::ExactlyOnce)).unwrap().unwrap();
        assert_eq!(r.state(), MessageState::WaitForPubrel);
        assert!(matches!(
            s.insert(record(10, Direction::Incoming, QoS::ExactlyOnce)),
            Err(DeliveryError::ReceiveMaximumExceeded)
        ));
    }

    #[test]
    fn test_set_state() {
        let mut s = outgoing(10, 10);
        s.insert(record(1, Direction::Outgoing, QoS::ExactlyOnce)).unwrap();
        s.set_state(1, MessageState::WaitForPubcomp).unwrap();
        assert_eq!(s.lookup(1).map(|r| r.state()), Some(MessageState::WaitForPubcomp));
        assert!(matches!(s.set_state(2, MessageState::WaitForPubcomp), Err(DeliveryError::NotFound)));
    }

    #[test]
    fn test_next_id_skips_used_and_zero() {
        let mut s = outgoing(10, 10);
        s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        assert_eq!(s.next_id().unwrap().get(), 2);
        s.next = u16::MAX;
        assert_eq!(s.next_id().unwrap().get(), u16::MAX);
        assert_eq!(s.next_id().unwrap().get(), 2);
    }

    #[test]
    fn test_due_for_retry() {
        let mut s = outgoing(10, 10);
        s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        let now = timestamp_millis();
        assert!(s.due_for_retry(60_000, now).is_empty());
        let due = s.due_for_retry(60_000, now + 60_000);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count(), 1);
        assert!(s.due_for_retry(60_000, now + 60_000).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut s = outgoing(1, 10);
        s.insert(record(1, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        s.insert(record(2, Direction::Outgoing, QoS::AtLeastOnce)).unwrap();
        assert_eq!(s.clear(), 2);
        assert!(s.is_empty());
        assert_eq!(s.quota().available(), 1);
    }
}
