use std::num::NonZeroU16;

use mqdeliver_codec::Publish;

use crate::message::MessageRecord;
use crate::session::Session;
use crate::state::{Event, SuccessGate};
use crate::types::{Advance, Direction, Outcome, RoleKind, TimestampMillis};
use crate::Result;

pub use self::broker::BrokerRole;
pub use self::client::ClientRole;

mod broker;
mod client;

/// Where a session's records live and who is told about completions.
///
/// The broker persists records in a [`MessageDatabase`](crate::database::MessageDatabase)
/// shared by all sessions; a client keeps them on the connection and reports
/// completions through its [`CallbackRegistry`](crate::callback::CallbackRegistry).
pub trait RoleAdapter: Send + Sync {
    fn kind(&self) -> RoleKind;

    #[inline]
    fn gate(&self) -> SuccessGate {
        match self.kind() {
            RoleKind::Broker => SuccessGate::ReasonCode,
            RoleKind::Client => SuccessGate::ReasonCodeOrPreV5,
        }
    }

    /// Applies an acknowledgment to the record it names.
    ///
    /// Fails with `NotFound` when no in-flight record holds the identifier, and
    /// with `Protocol` when the acknowledgment does not fit the record's state.
    /// Completing a record returns its quota slot and promotes queued records.
    fn advance(&self, session: &Session, direction: Direction, event: Event<'_>) -> Result<Advance>;

    /// Allocates an identifier and stores an outgoing message. The record is
    /// returned when it went in flight and has to be sent now.
    fn store_outgoing(&self, session: &Session, publish: Publish) -> Result<(NonZeroU16, Option<MessageRecord>)>;

    /// Stores an incoming QoS 2 message. Returns `false` if its identifier is
    /// already waiting for PUBREL, i.e. the PUBLISH is a retransmission.
    fn store_incoming(&self, session: &Session, publish: Publish) -> Result<bool>;

    /// Hands an application message received from the peer onwards.
    fn deliver(&self, session: &Session, publish: &Publish);

    fn due_for_retry(
        &self,
        session: &Session,
        interval_millis: TimestampMillis,
        now: TimestampMillis,
    ) -> Result<Vec<MessageRecord>>;

    fn inflight(&self, session: &Session, direction: Direction) -> Result<Vec<MessageRecord>>;

    /// Applies the peer's Receive Maximum of a (re)connect to the outgoing quota.
    /// Returns the queued records the new maximum let in flight.
    fn set_receive_maximum(&self, session: &Session, receive_maximum: u16) -> Result<Vec<MessageRecord>>;

    /// Drops every record of the session.
    fn clear(&self, session: &Session) -> Result<usize>;
}

#[inline]
pub(crate) fn completion(success: bool, reason_code: u8) -> Outcome {
    if success {
        Outcome::CompleteSuccess
    } else {
        Outcome::CompleteError(reason_code)
    }
}
