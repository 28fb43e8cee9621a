use std::time::Duration;

use bytestring::ByteString;
use serde::{Deserialize, Serialize};

pub use mqdeliver_codec::types::TimestampMillis;

use crate::message::MessageRecord;

pub type PacketId = u16;
pub type ClientId = ByteString;

/// Default Receive Maximum of MQTT v5, also used for older protocol levels.
pub const RECEIVE_MAXIMUM_DEFAULT: u16 = 65535;

/// Outgoing messages allowed to wait for a quota slot, per session.
pub const MAX_QUEUED_DEFAULT: usize = 1000;

/// Time an outgoing message may stay unacknowledged before it is resent.
pub const RETRY_INTERVAL_DEFAULT: Duration = Duration::from_secs(20);

/// Which side originated a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// We published it and wait for the peer's acknowledgments
    Outgoing,
    /// The peer published it to us
    Incoming,
}

impl Direction {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outgoing => "out",
            Direction::Incoming => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    New,
    Active,
    Disconnecting,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    #[default]
    Broker,
    Client,
}

/// Per session flow control limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of unacknowledged QoS 1 and 2 messages, `0` is treated as 65535
    pub receive_maximum: u16,
    /// Maximum number of messages waiting for a free in-flight slot, `0` means unbounded
    pub max_queued: usize,
}

impl Limits {
    #[inline]
    pub fn new(receive_maximum: u16, max_queued: usize) -> Self {
        Self { receive_maximum, max_queued }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self { receive_maximum: RECEIVE_MAXIMUM_DEFAULT, max_queued: MAX_QUEUED_DEFAULT }
    }
}

/// What applying an acknowledgment did to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The record moved to another waiting state
    Continue,
    /// The handshake finished and the record was destroyed
    CompleteSuccess,
    /// The peer rejected the message and the record was destroyed
    CompleteError(u8),
}

impl Outcome {
    #[inline]
    pub fn is_complete(&self) -> bool {
        !matches!(self, Outcome::Continue)
    }
}

/// Result of `RoleAdapter::advance`.
#[derive(Debug)]
pub struct Advance {
    pub outcome: Outcome,
    /// The destroyed record, present when `outcome` completes
    pub record: Option<MessageRecord>,
    /// Queued records promoted in flight by the freed quota, to be transmitted
    pub released: Vec<MessageRecord>,
}

impl Advance {
    #[inline]
    pub fn next() -> Self {
        Self { outcome: Outcome::Continue, record: None, released: Vec::new() }
    }

    #[inline]
    pub fn complete(outcome: Outcome, record: Option<MessageRecord>, released: Vec<MessageRecord>) -> Self {
        Self { outcome, record, released }
    }
}

#[inline]
pub(crate) fn duration_millis(d: Duration) -> TimestampMillis {
    d.as_millis() as TimestampMillis
}
