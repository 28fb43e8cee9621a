use std::num::NonZeroU16;
use std::sync::Arc;

use mqdeliver_codec::Publish;

use super::{completion, RoleAdapter};
use crate::callback::OnMessageFn;
use crate::database::MessageDatabase;
use crate::message::MessageRecord;
use crate::session::Session;
use crate::state::{Event, Transition};
use crate::types::{Advance, Direction, RoleKind, TimestampMillis};
use crate::{DeliveryError, Result};

/// Broker side, shared by all sessions of a broker.
pub struct BrokerRole {
    db: Arc<dyn MessageDatabase>,
    forward_fn: Option<Arc<dyn OnMessageFn>>,
}

impl BrokerRole {
    #[inline]
    pub fn new(db: Arc<dyn MessageDatabase>) -> Self {
        Self { db, forward_fn: None }
    }

    /// Receives every application message a client published to the broker.
    #[inline]
    pub fn on_forward<F>(mut self, f: F) -> Self
    where
        F: OnMessageFn,
    {
        self.forward_fn = Some(Arc::new(f));
        self
    }

    #[inline]
    pub fn database(&self) -> &Arc<dyn MessageDatabase> {
        &self.db
    }
}

impl RoleAdapter for BrokerRole {
    #[inline]
    fn kind(&self) -> RoleKind {
        RoleKind::Broker
    }

    fn advance(&self, session: &Session, direction: Direction, event: Event<'_>) -> Result<Advance> {
        let ack = event.ack;
        let success = self.gate().is_success(ack.reason_code, session.protocol());
        let record = self.db.lookup(session.id(), direction, ack.packet_id)?.ok_or(DeliveryError::NotFound)?;

        match record.state().next(direction, event.kind, success)? {
            Transition::Advance(to) => {
                self.db.update_outgoing(session.id(), ack.packet_id, to, record.qos())?;
                Ok(Advance::next())
            }
            Transition::Complete => {
                let outcome = completion(success, ack.reason_code);
                match direction {
                    Direction::Outgoing => {
                        let released =
                            self.db.delete_outgoing(session.id(), ack.packet_id, record.state(), record.qos())?;
                        Ok(Advance::complete(outcome, Some(record), released))
                    }
                    Direction::Incoming => {
                        let removed = self.db.delete_incoming(session.id(), ack.packet_id)?;
                        Ok(Advance::complete(outcome, Some(removed), Vec::new()))
                    }
                }
            }
        }
    }

    #[inline]
    fn store_outgoing(&self, session: &Session, publish: Publish) -> Result<(NonZeroU16, Option<MessageRecord>)> {
        self.db.insert_outgoing(session.id(), session.limits(), publish)
    }

    #[inline]
    fn store_incoming(&self, session: &Session, publish: Publish) -> Result<bool> {
        self.db.insert_incoming(session.id(), session.limits(), publish)
    }

    fn deliver(&self, session: &Session, publish: &Publish) {
        match self.forward_fn.as_ref() {
            Some(f) => f(session.id(), publish),
            None => log::debug!("{} no forwarder, message to {} dropped", session.id(), publish.topic),
        }
    }

    #[inline]
    fn due_for_retry(
        &self,
        session: &Session,
        interval_millis: TimestampMillis,
        now: TimestampMillis,
    ) -> Result<Vec<MessageRecord>> {
        self.db.due_for_retry(session.id(), interval_millis, now)
    }

    #[inline]
    fn inflight(&self, session: &Session, direction: Direction) -> Result<Vec<MessageRecord>> {
        self.db.inflight(session.id(), direction)
    }

    #[inline]
    fn set_receive_maximum(&self, session: &Session, receive_maximum: u16) -> Result<Vec<MessageRecord>> {
        self.db.set_receive_maximum(session.id(), receive_maximum)
    }

    #[inline]
    fn clear(&self, session: &Session) -> Result<usize> {
        self.db.remove_session(session.id())
    }
}
