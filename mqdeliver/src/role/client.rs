use std::num::NonZeroU16;

use mqdeliver_codec::Publish;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::{completion, RoleAdapter};
use crate::callback::CallbackRegistry;
use crate::message::MessageRecord;
use crate::session::Session;
use crate::state::{Event, Transition};
use crate::store::MessageStore;
use crate::types::{Advance, Direction, RoleKind, TimestampMillis};
use crate::{DeliveryError, Result};

/// Client side of a single connection.
///
/// The stores are created on first use with the limits of the session they
/// serve. Store locks are never held together and callbacks run with no lock
/// held.
pub struct ClientRole {
    stores: OnceCell<Stores>,
    callbacks: CallbackRegistry,
}

struct Stores {
    outgoing: Mutex<MessageStore>,
    incoming: Mutex<MessageStore>,
}

impl ClientRole {
    #[inline]
    pub fn new() -> Self {
        Self { stores: OnceCell::new(), callbacks: CallbackRegistry::new() }
    }

    #[inline]
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    #[inline]
    fn stores(&self, session: &Session) -> &Stores {
        self.stores.get_or_init(|| {
            let limits = session.limits();
            Stores {
                outgoing: Mutex::new(MessageStore::new(Direction::Outgoing, limits)),
                incoming: Mutex::new(MessageStore::new(Direction::Incoming, limits)),
            }
        })
    }

    #[inline]
    fn store(&self, session: &Session, direction: Direction) -> &Mutex<MessageStore> {
        let stores = self.stores(session);
        match direction {
            Direction::Outgoing => &stores.outgoing,
            Direction::Incoming => &stores.incoming,
        }
    }
}

impl Default for ClientRole {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleAdapter for ClientRole {
    #[inline]
    fn kind(&self) -> RoleKind {
        RoleKind::Client
    }

    fn advance(&self, session: &Session, direction: Direction, event: Event<'_>) -> Result<Advance> {
        let ack = event.ack;
        let success = self.gate().is_success(ack.reason_code, session.protocol());
        let store = self.store(session, direction);

        let removed = {
            let mut s = store.lock();
            let state = s.lookup(ack.packet_id.get()).ok_or(DeliveryError::NotFound)?.state();
            match state.next(direction, event.kind, success)? {
                Transition::Advance(to) => {
                    s.set_state(ack.packet_id.get(), to)?;
                    return Ok(Advance::next());
                }
                Transition::Complete => s.remove(ack.packet_id.get()),
            }
        };

        if removed.is_some() && direction == Direction::Outgoing {
            self.callbacks.invoke_on_publish(session.id(), ack.packet_id, ack.reason_code, &ack.properties);
        }

        let released = {
            let mut s = store.lock();
            s.quota_mut().increment();
            s.release_to_inflight()
        };
        Ok(Advance::complete(completion(success, ack.reason_code), removed, released))
    }

    fn store_outgoing(&self, session: &Session, publish: Publish) -> Result<(NonZeroU16, Option<MessageRecord>)> {
        let mut out = self.store(session, Direction::Outgoing).lock();
        let packet_id = out.next_id()?;
        let sent = out.insert(MessageRecord::new(packet_id, Direction::Outgoing, publish))?;
        Ok((packet_id, sent))
    }

    fn store_incoming(&self, session: &Session, publish: Publish) -> Result<bool> {
        let packet_id = publish.packet_id.ok_or_else(|| DeliveryError::protocol("packet identifier missing"))?;
        let mut incoming = self.store(session, Direction::Incoming).lock();
        if incoming.contains(packet_id.get()) {
            return Ok(false);
        }
        incoming.insert(MessageRecord::new(packet_id, Direction::Incoming, publish))?;
        Ok(true)
    }

    #[inline]
    fn deliver(&self, session: &Session, publish: &Publish) {
        self.callbacks.invoke_on_message(session.id(), publish);
    }

    #[inline]
    fn due_for_retry(
        &self,
        session: &Session,
        interval_millis: TimestampMillis,
        now: TimestampMillis,
    ) -> Result<Vec<MessageRecord>> {
        Ok(self.store(session, Direction::Outgoing).lock().due_for_retry(interval_millis, now))
    }

    #[inline]
    fn inflight(&self, session: &Session, direction: Direction) -> Result<Vec<MessageRecord>> {
        Ok(self.store(session, direction).lock().inflight())
    }

    fn set_receive_maximum(&self, session: &Session, receive_maximum: u16) -> Result<Vec<MessageRecord>> {
        let mut out = self.store(session, Direction::Outgoing).lock();
        out.quota_mut().reset(receive_maximum);
        Ok(out.release_to_inflight())
    }

    fn clear(&self, session: &Session) -> Result<usize> {
        let n = self.store(session, Direction::Outgoing).lock().clear();
        Ok(n + self.store(session, Direction::Incoming).lock().clear())
    }
}
