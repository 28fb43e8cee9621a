use std::num::NonZeroU16;
use std::sync::Arc;

use dashmap::DashMap;
use mqdeliver_codec::{Publish, QoS};
use parking_lot::Mutex;

use crate::message::MessageRecord;
use crate::state::MessageState;
use crate::store::MessageStore;
use crate::types::{ClientId, Direction, Limits, TimestampMillis};
use crate::{DeliveryError, Result};

/// Broker-side persistence of in-flight messages, keyed by session, direction
/// and packet identifier.
///
/// Missing records are reported as `DeliveryError::NotFound`, a QoS or state
/// that does not match the caller's expectation as `DeliveryError::Protocol`.
pub trait MessageDatabase: Send + Sync {
    /// Allocates an identifier and stores the message, see `MessageStore::insert`.
    fn insert_outgoing(
        &self,
        id: &ClientId,
        limits: Limits,
        publish: Publish,
    ) -> Result<(NonZeroU16, Option<MessageRecord>)>;

    /// Stores an incoming QoS 2 message, `false` if its identifier is taken.
    fn insert_incoming(&self, id: &ClientId, limits: Limits, publish: Publish) -> Result<bool>;

    fn lookup(&self, id: &ClientId, direction: Direction, packet_id: NonZeroU16) -> Result<Option<MessageRecord>>;

    fn update_outgoing(&self, id: &ClientId, packet_id: NonZeroU16, state: MessageState, qos: QoS) -> Result<()>;

    /// Deletes an outgoing record in `expect_state`, returns its quota slot and
    /// yields the queued records that took it.
    fn delete_outgoing(
        &self,
        id: &ClientId,
        packet_id: NonZeroU16,
        expect_state: MessageState,
        qos: QoS,
    ) -> Result<Vec<MessageRecord>>;

    fn delete_incoming(&self, id: &ClientId, packet_id: NonZeroU16) -> Result<MessageRecord>;

    fn due_for_retry(
        &self,
        id: &ClientId,
        interval_millis: TimestampMillis,
        now: TimestampMillis,
    ) -> Result<Vec<MessageRecord>>;

    fn inflight(&self, id: &ClientId, direction: Direction) -> Result<Vec<MessageRecord>>;

    /// Resets the outgoing quota to a new maximum, see `SendQuota::reset`.
    fn set_receive_maximum(&self, id: &ClientId, receive_maximum: u16) -> Result<Vec<MessageRecord>>;

    fn remove_session(&self, id: &ClientId) -> Result<usize>;
}

struct SessionStores {
    outgoing: Mutex<MessageStore>,
    incoming: Mutex<MessageStore>,
}

impl SessionStores {
    fn new(limits: Limits) -> Self {
        Self {
            outgoing: Mutex::new(MessageStore::new(Direction::Outgoing, limits)),
            incoming: Mutex::new(MessageStore::new(Direction::Incoming, limits)),
        }
    }

    #[inline]
    fn store(&self, direction: Direction) -> &Mutex<MessageStore> {
        match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        }
    }
}

/// In-memory [`MessageDatabase`].
#[derive(Default)]
pub struct MemoryDatabase {
    sessions: DashMap<ClientId, Arc<SessionStores>, ahash::RandomState>,
}

impl MemoryDatabase {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn sessions(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    fn get(&self, id: &ClientId) -> Result<Arc<SessionStores>> {
        self.sessions.get(id).map(|s| s.value().clone()).ok_or(DeliveryError::NotFound)
    }

    #[inline]
    fn get_or_create(&self, id: &ClientId, limits: Limits) -> Arc<SessionStores> {
        self.sessions.entry(id.clone()).or_insert_with(|| Arc::new(SessionStores::new(limits))).value().clone()
    }
}

impl MessageDatabase for MemoryDatabase {
    fn insert_outgoing(
        &self,
        id: &ClientId,
        limits: Limits,
        publish: Publish,
    ) -> Result<(NonZeroU16, Option<MessageRecord>)> {
        let stores = self.get_or_create(id, limits);
        let mut out = stores.outgoing.lock();
        let packet_id = out.next_id()?;
        let sent = out.insert(MessageRecord::new(packet_id, Direction::Outgoing, publish))?;
        Ok((packet_id, sent))
    }

    fn insert_incoming(&self, id: &ClientId, limits: Limits, publish: Publish) -> Result<bool> {
        let packet_id = publish.packet_id.ok_or_else(|| DeliveryError::protocol("packet identifier missing"))?;
        let stores = self.get_or_create(id, limits);
        let mut incoming = stores.incoming.lock();
        if incoming.contains(packet_id.get()) {
            return Ok(false);
        }
        incoming.insert(MessageRecord::new(packet_id, Direction::Incoming, publish))?;
        Ok(true)
    }

    fn lookup(&self, id: &ClientId, direction: Direction, packet_id: NonZeroU16) -> Result<Option<MessageRecord>> {
        let stores = match self.get(id) {
            Ok(stores) => stores,
            Err(DeliveryError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };
        let record = stores.store(direction).lock().lookup(packet_id.get()).cloned();
        Ok(record)
    }

    fn update_outgoing(&self, id: &ClientId, packet_id: NonZeroU16, state: MessageState, qos: QoS) -> Result<()> {
        let stores = self.get(id)?;
        let mut out = stores.outgoing.lock();
        let record = out.lookup(packet_id.get()).ok_or(DeliveryError::NotFound)?;
        if record.qos() != qos {
            return Err(DeliveryError::protocol(format!("QoS mismatch for packet identifier {}", packet_id)));
        }
        out.set_state(packet_id.get(), state)
    }

    fn delete_outgoing(
        &self,
        id: &ClientId,
        packet_id: NonZeroU16,
        expect_state: MessageState,
        qos: QoS,
    ) -> Result<Vec<MessageRecord>> {
        let stores = self.get(id)?;
        let mut out = stores.outgoing.lock();
        let record = out.lookup(packet_id.get()).ok_or(DeliveryError::NotFound)?;
        if record.qos() != qos {
            return Err(DeliveryError::protocol(format!("QoS mismatch for packet identifier {}", packet_id)));
        }
        if qos == QoS::ExactlyOnce && record.state() != expect_state {
            return Err(DeliveryError::protocol(format!(
                "packet identifier {} is in state {:?}, expected {:?}",
                packet_id,
                record.state(),
                expect_state
            )));
        }
        out.remove(packet_id.get());
        out.quota_mut().increment();
        Ok(out.release_to_inflight())
    }

    fn delete_incoming(&self, id: &ClientId, packet_id: NonZeroU16) -> Result<MessageRecord> {
        let stores = self.get(id)?;
        let mut incoming = stores.incoming.lock();
        let record = incoming.remove(packet_id.get()).ok_or(DeliveryError::NotFound)?;
        incoming.quota_mut().increment();
        Ok(record)
    }

    fn due_for_retry(
        &self,
        id: &ClientId,
        interval_millis: TimestampMillis,
        now: TimestampMillis,
    ) -> Result<Vec<MessageRecord>> {
        match self.get(id) {
            Ok(stores) => Ok(stores.outgoing.lock().due_for_retry(interval_millis, now)),
            Err(DeliveryError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn inflight(&self, id: &ClientId, direction: Direction) -> Result<Vec<MessageRecord>> {
        match self.get(id) {
            Ok(stores) => Ok(stores.store(direction).lock().inflight()),
            Err(DeliveryError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn set_receive_maximum(&self, id: &ClientId, receive_maximum: u16) -> Result<Vec<MessageRecord>> {
        match self.get(id) {
            Ok(stores) => {
                let mut out = stores.outgoing.lock();
                out.quota_mut().reset(receive_maximum);
                Ok(out.release_to_inflight())
            }
            Err(DeliveryError::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn remove_session(&self, id: &ClientId) -> Result<usize> {
        Ok(self
            .sessions
            .remove(id)
            .map(|(_, stores)| stores.outgoing.lock().clear() + stores.incoming.lock().clear())
            .unwrap_or_default())
    }
}
