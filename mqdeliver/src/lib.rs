#![deny(unsafe_code)]

//! Reliable delivery of MQTT QoS 1 and QoS 2 messages
//!
//! Tracks every message of a session that still waits for an acknowledgment,
//! drives the PUBACK and PUBREC/PUBREL/PUBCOMP handshakes, enforces the send
//! quota (Receive Maximum) and retransmits what the peer has not settled.
//!
//! The same handlers serve both sides of a connection; a [`RoleAdapter`]
//! decides where records live and who hears about completions:
//! - [`BrokerRole`] persists records in a shared [`MessageDatabase`]
//! - [`ClientRole`] keeps them on the connection and calls the application
//!   through its [`CallbackRegistry`]
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqdeliver::{BrokerRole, FramedSender, MemoryDatabase, Session, ConnectionState};
//! use mqdeliver_codec::{PacketReader, Protocol};
//!
//! let role = Arc::new(BrokerRole::new(Arc::new(MemoryDatabase::new())));
//! let sender = Arc::new(FramedSender::new(Protocol::V5, std::io::sink()));
//! let session = Session::new("client-1", Protocol::V5, role, sender);
//! session.set_state(ConnectionState::Active);
//! # let frame = bytes::Bytes::from_static(b"\x50\x02\x00\x07");
//! let mut reader = PacketReader::from_frame(frame)?;
//! session.handle_packet(&mut reader)?;
//! # Ok::<(), mqdeliver::DeliveryError>(())
//! ```

pub mod callback;
pub mod database;
mod delivery;
pub mod error;
pub mod logger;
pub mod message;
pub mod quota;
pub mod role;
pub mod sender;
pub mod session;
pub mod settings;
pub mod state;
pub mod store;
pub mod types;
pub mod utils;

pub use callback::{CallbackRegistry, OnMessageFn, OnPublishFn};
pub use database::{MemoryDatabase, MessageDatabase};
pub use error::DeliveryError;
pub use message::MessageRecord;
pub use quota::SendQuota;
pub use role::{BrokerRole, ClientRole, RoleAdapter};
pub use sender::{FramedSender, PacketSender};
pub use session::Session;
pub use state::{Event, MessageState, SuccessGate, Transition};
pub use store::MessageStore;
pub use types::{Advance, ClientId, ConnectionState, Direction, Limits, Outcome, RoleKind};

pub use mqdeliver_codec as codec;

pub type Result<T, E = DeliveryError> = std::result::Result<T, E>;
