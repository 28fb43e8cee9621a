#![deny(unsafe_code)]

//! MQTT PUBLISH and acknowledgment packet codec
//!
//! ## Core Features:
//! - **Acknowledgment packets**: PUBACK, PUBREC, PUBREL and PUBCOMP with per-type reason code allow-lists
//! - **Protocol gating**: reason codes and property blocks are only read from MQTT v5 connections
//! - **Property blocks**: full MQTT v5 property identifier table with per-packet validation
//! - **Tokio Integration**: framing via `tokio_util::codec`
//!
//! Decoding errors distinguish protocol violations (`DecodeError::is_protocol`) from
//! framing that could not be parsed at all.

#[macro_use]
mod utils;

/// Acknowledgment packets of the QoS 1 and QoS 2 handshakes
pub mod ack;

/// Framing codec
pub mod codec;

/// Error types for encoding/decoding operations
pub mod error;

/// MQTT v5 property blocks
pub mod properties;

/// PUBLISH packet
pub mod publish;

/// Cursor over a single packet body
pub mod reader;

/// Shared types and constants for MQTT protocol
pub mod types;

pub use ack::{Ack, AckKind, PublishAck2Reason, PublishAckReason};
pub use codec::{Codec, Packet};
pub use error::{DecodeError, EncodeError};
pub use properties::{parse_all, Properties, PropertyId, PropertyValue};
pub use publish::Publish;
pub use reader::PacketReader;
pub use types::{Protocol, QoS};
