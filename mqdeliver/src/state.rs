use mqdeliver_codec::ack::RC_ERROR_THRESHOLD;
use mqdeliver_codec::{Ack, AckKind, Protocol, QoS};
use serde::{Deserialize, Serialize};

use crate::types::Direction;
use crate::{DeliveryError, Result};

/// Position of a tracked message within its handshake.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum MessageState {
    /// Waiting for a free in-flight slot, not transmitted yet
    Queued,
    /// Outgoing QoS 1, PUBLISH sent
    WaitForPuback,
    /// Outgoing QoS 2, PUBLISH sent
    WaitForPubrec,
    /// Outgoing QoS 2, PUBREC received and PUBREL sent
    WaitForPubcomp,
    /// Incoming QoS 2, PUBREC sent
    WaitForPubrel,
}

impl MessageState {
    /// State a message enters when it is put in flight. QoS 0 and incoming QoS 1
    /// messages are never tracked.
    #[inline]
    pub fn initial(direction: Direction, qos: QoS) -> Option<MessageState> {
        match (direction, qos) {
            (Direction::Outgoing, QoS::AtLeastOnce) => Some(MessageState::WaitForPuback),
            (Direction::Outgoing, QoS::ExactlyOnce) => Some(MessageState::WaitForPubrec),
            (Direction::Incoming, QoS::ExactlyOnce) => Some(MessageState::WaitForPubrel),
            _ => None,
        }
    }

    #[inline]
    pub fn is_inflight(self) -> bool {
        !matches!(self, MessageState::Queued)
    }

    /// Applies an acknowledgment of `kind` to a record in this state. `success`
    /// is the verdict of the role's `SuccessGate` on the packet's reason code.
    pub fn next(self, direction: Direction, kind: AckKind, success: bool) -> Result<Transition> {
        use MessageState::*;
        let t = match (direction, self, kind) {
            (Direction::Outgoing, WaitForPuback, AckKind::PubAck) => Transition::Complete,
            (Direction::Outgoing, WaitForPubrec, AckKind::PubRec) if success => Transition::Advance(WaitForPubcomp),
            (Direction::Outgoing, WaitForPubrec, AckKind::PubRec) => Transition::Complete,
            //the PUBREL got lost, the peer repeats its PUBREC
            (Direction::Outgoing, WaitForPubcomp, AckKind::PubRec) if success => Transition::Advance(WaitForPubcomp),
            (Direction::Outgoing, WaitForPubcomp, AckKind::PubComp) => Transition::Complete,
            (Direction::Incoming, WaitForPubrel, AckKind::PubRel) => Transition::Complete,
            (direction, state, kind) => {
                return Err(DeliveryError::protocol(format!(
                    "unexpected {} for {} message in state {:?}",
                    kind.name(),
                    direction.as_str(),
                    state
                )))
            }
        };
        Ok(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance(MessageState),
    /// The record leaves the store
    Complete,
}

/// An acknowledgment received for a tracked message.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    pub kind: AckKind,
    pub ack: &'a Ack,
}

impl<'a> Event<'a> {
    #[inline]
    pub fn new(kind: AckKind, ack: &'a Ack) -> Self {
        Self { kind, ack }
    }
}

/// Decides whether a reason code continues the handshake or fails it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessGate {
    /// Reason codes below 0x80 succeed
    ReasonCode,
    /// As `ReasonCode`, and every packet of a pre-v5 connection succeeds
    ReasonCodeOrPreV5,
}

impl SuccessGate {
    #[inline]
    pub fn is_success(self, reason_code: u8, protocol: Protocol) -> bool {
        match self {
            SuccessGate::ReasonCode => reason_code < RC_ERROR_THRESHOLD,
            SuccessGate::ReasonCodeOrPreV5 => reason_code < RC_ERROR_THRESHOLD || !protocol.is_v5(),
        }
    }
}
