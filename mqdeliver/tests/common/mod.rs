#![allow(dead_code)]

use std::io;
use std::num::NonZeroU16;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use mqdeliver::codec::{Ack, AckKind, Packet, PacketReader, Protocol, Publish, QoS};
use mqdeliver::{
    BrokerRole, ClientId, ClientRole, ConnectionState, DeliveryError, Direction, Limits, MemoryDatabase,
    MessageRecord, PacketSender, Result, Session,
};

#[derive(Default)]
pub struct Recorder {
    packets: Mutex<Vec<Packet>>,
    broken: AtomicBool,
}

impl Recorder {
    pub fn take(&self) -> Vec<Packet> {
        std::mem::take(&mut *self.packets.lock())
    }

    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::SeqCst);
    }
}

impl PacketSender for Recorder {
    fn send(&self, _id: &ClientId, packet: Packet) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(DeliveryError::Transport(io::ErrorKind::BrokenPipe.into()));
        }
        self.packets.lock().push(packet);
        Ok(())
    }
}

pub fn init_log() {
    let _ = simple_logger::SimpleLogger::new().with_level(log::LevelFilter::Debug).init();
}

pub fn frame(bytes: &'static [u8]) -> PacketReader {
    PacketReader::from_frame(Bytes::from_static(bytes)).unwrap()
}

pub fn pid(id: u16) -> NonZeroU16 {
    NonZeroU16::new(id).unwrap()
}

pub fn message(qos: QoS) -> Publish {
    Publish::new("sensors/1", Bytes::from_static(b"21.5"), qos)
}

pub fn pubrel(id: u16) -> Packet {
    Packet::Ack(AckKind::PubRel, Ack::new(pid(id)))
}

pub fn client(protocol: Protocol, limits: Limits) -> (Arc<Session>, Arc<ClientRole>, Arc<Recorder>) {
    init_log();
    let role = Arc::new(ClientRole::new());
    let sender = Arc::new(Recorder::default());
    let session = Session::new("client-1", protocol, role.clone(), sender.clone()).with_limits(limits);
    session.set_state(ConnectionState::Active);
    (Arc::new(session), role, sender)
}

pub fn broker(protocol: Protocol, limits: Limits) -> (Arc<Session>, Arc<MemoryDatabase>, Arc<Recorder>) {
    init_log();
    let db = Arc::new(MemoryDatabase::new());
    let role = Arc::new(BrokerRole::new(db.clone()));
    let sender = Arc::new(Recorder::default());
    let session = Session::new("client-1", protocol, role, sender.clone()).with_limits(limits);
    session.set_state(ConnectionState::Active);
    (Arc::new(session), db, sender)
}

/// Publishes `n` messages of `qos`, returns the last packet identifier.
pub fn publish_n(session: &Session, qos: QoS, n: usize) -> NonZeroU16 {
    let mut last = None;
    for _ in 0..n {
        last = session.publish(message(qos)).unwrap();
    }
    last.unwrap()
}

pub fn outgoing(session: &Session, id: u16) -> Option<MessageRecord> {
    session.inflight(Direction::Outgoing).unwrap().into_iter().find(|r| r.packet_id().get() == id)
}

pub fn sent_publish_ids(packets: &[Packet]) -> Vec<u16> {
    packets
        .iter()
        .filter_map(|p| match p {
            Packet::Publish(p) => p.packet_id.map(|id| id.get()),
            _ => None,
        })
        .collect()
}
